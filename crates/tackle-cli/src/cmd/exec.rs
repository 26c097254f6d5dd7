use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::Context;

/// Run `exe_name`, installing its package first if needed.
pub async fn exec(ctx: &Context, exe_name: &str, args: &[String], cancel: &CancellationToken) -> i32 {
    match ctx.controller().exec(exe_name, args, cancel).await {
        Ok(outcome) => {
            debug!(exe_name, exit_code = outcome.exit_code(), "Command finished");
            outcome.exit_code()
        }
        Err(e) => {
            eprintln!("tackle: {e}");
            e.exit_code()
        }
    }
}
