// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::saga::{Saga, SagaStep, StepOutcome};
use crate::EngineError;
use async_trait::async_trait;
use std::time::Duration;

struct Hang;

#[async_trait]
impl SagaStep for Hang {
    type Output = ();

    fn name(&self) -> &str {
        "wait forever"
    }

    async fn execute(&self) -> Result<StepOutcome<()>, EngineError> {
        std::future::pending::<()>().await;
        Ok(StepOutcome::done(()))
    }
}

#[tokio::test]
async fn signal_cancels_the_token() {
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let token = cancel_on(rx);
    assert!(!token.is_cancelled());

    tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), token.cancelled()).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn token_stays_live_until_the_signal() {
    let token = cancel_on(tokio::time::sleep(Duration::from_secs(60)));
    tokio::time::sleep(Duration::from_secs(59)).await;
    assert!(!token.is_cancelled());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(token.is_cancelled());
}

#[tokio::test]
async fn saga_unwinds_on_signal() {
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let mut saga = Saga::new(cancel_on(rx));
    tx.send(()).unwrap();
    let err = saga.step(Hang).await.unwrap_err();
    assert!(err.is_interrupted());
    assert_eq!(err.failed_step(), Some("wait forever"));
}
