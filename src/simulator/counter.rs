use super::state::ServerSnapshot;
use crate::error::{DiuError, Result};
use crate::opcua_server::Diu;
use std::time::Duration;
use tokio::sync::broadcast;

/// Wrapping `u32` counter, starts at 0.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Counter(u32);

impl Counter {
    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn advance(&mut self) -> u32 {
        self.0 = self.0.wrapping_add(1);
        self.0
    }
}

/// Writes an ever-increasing counter into the first device's local value.
pub struct CounterDriver {
    target: Diu,
    devices: Vec<Diu>,
    counter: Counter,
    tx: broadcast::Sender<ServerSnapshot>,
}

impl CounterDriver {
    pub fn new(devices: Vec<Diu>, tx: broadcast::Sender<ServerSnapshot>) -> Result<Self> {
        let target = devices
            .first()
            .cloned()
            .ok_or_else(|| DiuError::InvalidConfig("no device to drive".to_string()))?;

        Ok(Self {
            target,
            devices,
            counter: Counter::default(),
            tx,
        })
    }

    pub fn counter(&self) -> Counter {
        self.counter
    }

    /// Publish the counter's current value without advancing it.
    pub fn start(&mut self) {
        self.write_current();
    }

    pub fn step(&mut self) -> u32 {
        let value = self.counter.advance();
        self.write_current();
        value
    }

    pub fn snapshot(&self) -> ServerSnapshot {
        ServerSnapshot {
            counter: self.counter.value(),
            devices: self.devices.iter().map(Diu::snapshot).collect(),
        }
    }

    pub async fn run(mut self, period: Duration) {
        tracing::info!(
            "Counter loop started: {} local value every {:?}",
            self.target.name(),
            period
        );

        self.start();

        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            let value = self.step();
            tracing::debug!("{} local value = {}", self.target.name(), value);
        }
    }

    fn write_current(&mut self) {
        if let Err(e) = self.target.set_local_value(self.counter.value()) {
            tracing::warn!("Failed to update {}: {}", self.target.name(), e);
            return;
        }

        if self.tx.receiver_count() > 0 {
            let _ = self.tx.send(self.snapshot());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcua_server::server::populate;
    use crate::opcua_server::DiuField;
    use opcua::server::prelude::{AddressSpace, Variant};
    use opcua::sync::RwLock;
    use std::sync::Arc;

    fn devices() -> Vec<Diu> {
        let address_space = Arc::new(RwLock::new(AddressSpace::new()));
        populate(address_space, "http://diu.test", &[1, 2, 3, 4])
            .unwrap()
            .1
    }

    #[test]
    fn test_counter_starts_at_zero() {
        let mut counter = Counter::default();
        assert_eq!(counter.value(), 0);
        assert_eq!(counter.advance(), 1);
    }

    #[test]
    fn test_counter_wraps() {
        let mut counter = Counter(u32::MAX);
        assert_eq!(counter.advance(), 0);
        assert_eq!(counter.advance(), 1);
    }

    #[test]
    fn test_driver_rejects_empty_device_list() {
        let (tx, _rx) = broadcast::channel(4);
        assert!(CounterDriver::new(Vec::new(), tx).is_err());
    }

    #[test]
    fn test_start_writes_zero_then_steps_increment() {
        let devices = devices();
        let (tx, _rx) = broadcast::channel(4);
        let mut driver = CounterDriver::new(devices.clone(), tx).unwrap();

        driver.start();
        assert_eq!(devices[0].read(DiuField::LocalValue), Some(Variant::UInt32(0)));

        assert_eq!(driver.step(), 1);
        assert_eq!(driver.step(), 2);
        assert_eq!(devices[0].read(DiuField::LocalValue), Some(Variant::UInt32(2)));
        assert_eq!(driver.counter().value(), 2);
    }

    #[test]
    fn test_only_first_device_is_driven() {
        let devices = devices();
        let (tx, _rx) = broadcast::channel(4);
        let mut driver = CounterDriver::new(devices.clone(), tx).unwrap();

        driver.start();
        driver.step();

        for diu in &devices[1..] {
            assert_eq!(diu.read(DiuField::LocalValue), Some(Variant::UInt32(8)));
        }
    }

    #[test]
    fn test_step_publishes_snapshot_to_subscribers() {
        let devices = devices();
        let (tx, mut rx) = broadcast::channel(4);
        let mut driver = CounterDriver::new(devices, tx).unwrap();

        driver.step();

        let snapshot = rx.try_recv().unwrap();
        assert_eq!(snapshot.counter, 1);
        assert_eq!(snapshot.devices.len(), 4);
        assert_eq!(snapshot.devices[0].local_value, 1);
        assert_eq!(snapshot.devices[1].local_value, 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_advances_once_per_period() {
        let devices = devices();
        let (tx, _rx) = broadcast::channel(16);
        let driver = CounterDriver::new(devices.clone(), tx).unwrap();

        let handle = tokio::spawn(driver.run(Duration::from_secs(5)));

        // first tick fires immediately
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(devices[0].read(DiuField::LocalValue), Some(Variant::UInt32(1)));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(devices[0].read(DiuField::LocalValue), Some(Variant::UInt32(2)));

        handle.abort();
    }
}
