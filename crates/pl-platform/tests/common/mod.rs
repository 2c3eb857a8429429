#![allow(dead_code)]

use chrono::{DateTime, Utc};
use pl_core::ports::{ClockPort, CycleSignal, ServiceContext};
use pl_core::{DeviceId, DeviceType, LocalDevice};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

pub struct WallClock;

impl ClockPort for WallClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub fn clock() -> Arc<dyn ClockPort> {
    Arc::new(WallClock)
}

pub fn local_device(id: &str) -> LocalDevice {
    LocalDevice {
        id: DeviceId::new(id),
        name: format!("{id}-host"),
        device_type: DeviceType::Desktop,
        capabilities: ["file_transfer".to_string()].into_iter().collect(),
        service_port: 8080,
        host: Some("127.0.0.1".parse().unwrap()),
    }
}

pub fn context() -> (ServiceContext, CancellationToken, broadcast::Sender<CycleSignal>) {
    let cancel = CancellationToken::new();
    let (cycles, _) = broadcast::channel(16);
    (
        ServiceContext::new(cancel.clone(), cycles.clone()),
        cancel,
        cycles,
    )
}

/// Poll `check` until it holds or `deadline` passes.
pub async fn eventually<F, Fut>(deadline: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let until = tokio::time::Instant::now() + deadline;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= until {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
