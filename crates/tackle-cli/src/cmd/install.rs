use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context as _, Result, bail};
use tackle_core::install::verify_and_install;
use tackle_core::paths;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::Context;

/// Install every applicable package of the nearest configuration and link
/// a shim for each executable.
pub async fn install(ctx: &Context, only_link: bool, cancel: &CancellationToken) -> Result<()> {
    let Some(config_file) = ctx.settings.config_files.first() else {
        bail!("No configuration file found");
    };
    let found = ctx.resolver.list_packages(config_file).await?;

    let bin_dir = paths::bin_path(&ctx.settings.root_dir);
    std::fs::create_dir_all(&bin_dir)
        .with_context(|| format!("Failed to create {}", bin_dir.display()))?;
    let tackle = std::env::current_exe().context("Failed to locate the tackle binary")?;

    let mut installed = HashSet::new();
    for find in &found {
        link_shim(&tackle, &bin_dir.join(&find.file.name))?;
        if only_link || !installed.insert(find.package.to_string()) {
            continue;
        }
        info!(package = %find.package, "Installing");
        verify_and_install(ctx.installer.as_ref(), find, cancel)
            .await
            .with_context(|| format!("Failed to install {}", find.package))?;
    }
    Ok(())
}

fn link_shim(tackle: &Path, shim: &Path) -> Result<()> {
    if shim.symlink_metadata().is_ok() {
        debug!(shim = %shim.display(), "Shim already exists");
        return Ok(());
    }
    #[cfg(unix)]
    std::os::unix::fs::symlink(tackle, shim)
        .with_context(|| format!("Failed to link {}", shim.display()))?;
    #[cfg(not(unix))]
    std::fs::copy(tackle, shim).with_context(|| format!("Failed to copy {}", shim.display()))?;
    Ok(())
}
