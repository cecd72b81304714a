use std::thread;

use tracing::{error, warn};

use crate::error::Result;
use crate::harness::CancelToken;

/// Cancels `token` on the first Ctrl-C. Workers stop taking new iterations,
/// so the run winds down and reports what finished. A second Ctrl-C exits
/// immediately with status 130.
pub fn install_interrupt_handler(token: CancelToken) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    thread::Builder::new()
        .name("interrupt".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("failed to listen for ctrl-c: {e}");
                    return;
                }
                warn!("interrupted, finishing in-flight statements");
                token.cancel();

                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupted again, exiting");
                    std::process::exit(130);
                }
            })
        })?;

    Ok(())
}
