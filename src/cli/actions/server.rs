use crate::cli::actions::Action;
use crate::lanshare::new;
use anyhow::Result;

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server { opts } => {
            new(*opts).await?;
        }
    }

    Ok(())
}
