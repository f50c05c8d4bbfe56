pub mod server;

use crate::lanshare::Options;

#[derive(Debug)]
pub enum Action {
    Server { opts: Box<Options> },
}
