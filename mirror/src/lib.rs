// Copyright (c) Circle Ledger Contributors
// SPDX-License-Identifier: Apache-2.0

//! Mirror of on-chain group-ledger state into a queryable off-chain
//! store, plus threshold-signed fund-transfer proposal coordination.

pub mod chain_client;
pub mod chain_syncer;
pub mod config;
pub mod error;
pub mod health;
pub mod ingester;
pub mod kv;
pub mod metrics;
pub mod node;
pub mod notify;
pub mod proposals;
pub mod reconciler;
pub mod store;
pub mod types;

#[cfg(test)]
pub mod mock_chain_client;

#[macro_export]
macro_rules! retry_with_max_elapsed_time {
    ($func:expr, $max_elapsed_time:expr) => {{
        // The following delay sequence (in secs) will be used, applied with jitter
        // 0.4, 0.8, 1.6, 3.2, 6.4, 12.8, 25.6, 30, 60, 120, 120 ...
        let backoff = backoff::ExponentialBackoff {
            initial_interval: Duration::from_millis(400),
            randomization_factor: 0.1,
            multiplier: 2.0,
            max_interval: Duration::from_secs(120),
            max_elapsed_time: Some($max_elapsed_time),
            ..Default::default()
        };
        backoff::future::retry(backoff, || {
            let fut = async {
                let result = $func.await;
                match result {
                    Ok(_) => {
                        return Ok(result);
                    }
                    Err(e) => {
                        // Every error is treated as transient so the call retries until max_elapsed_time
                        tracing::debug!("Retrying due to error: {:?}", e);
                        return Err(backoff::Error::transient(e));
                    }
                }
            };
            std::boxed::Box::pin(fut)
        })
        .await
    }};
}
