// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process interrupts as saga cancellation.
//!
//! Pass the token to [`Deployer::new`](crate::Deployer::new) or
//! [`TemplateBuilder::new`](crate::TemplateBuilder::new); an interrupt then
//! unwinds whatever the run created so far.

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::warn;

/// A token cancelled on the first Ctrl-C. Must be called inside a runtime.
pub fn on_ctrl_c() -> CancellationToken {
    cancel_on(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for interrupts");
            std::future::pending::<()>().await;
        }
    })
}

/// A token cancelled once `signal` completes. The listener exits when the
/// token is cancelled by anyone else.
pub fn cancel_on<F>(signal: F) -> CancellationToken
where
    F: Future + Send + 'static,
    F::Output: Send,
{
    let token = CancellationToken::new();
    let listener = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = listener.cancelled() => {}
            _ = signal => {
                warn!("interrupt received, unwinding");
                listener.cancel();
            }
        }
    });
    token
}

#[cfg(test)]
#[path = "interrupt_tests.rs"]
mod tests;
