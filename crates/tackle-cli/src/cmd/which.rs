use tackle_core::which::Which;

use super::{Context, which_exit_code};

/// Print the executable path `exe_name` resolves to.
pub async fn which(ctx: &Context, exe_name: &str) -> i32 {
    match ctx.resolver.which(exe_name).await {
        Ok(result) => {
            println!("{}", result.exe_path.display());
            0
        }
        Err(e) => {
            eprintln!("tackle: {e}");
            which_exit_code(&e)
        }
    }
}
