//! Standard trait implementations for EventBus

use std::sync::atomic::Ordering;

use crate::events::config::EventBusConfig;

use super::core::EventBus;

impl Default for EventBus {
    fn default() -> Self {
        Self::with_config(EventBusConfig::default())
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        // Increment instance count (follows tokio's broadcast::Sender pattern)
        self.num_instances.fetch_add(1, Ordering::Relaxed);
        Self {
            sender: self.sender.clone(),
            config: self.config.clone(),
            metrics: self.metrics.clone(),
            shutdown: self.shutdown.clone(),
            shutdown_flag: self.shutdown_flag.clone(),
            capacity_notify: self.capacity_notify.clone(),
            send_lock: self.send_lock.clone(),
            consecutive_timeouts: self.consecutive_timeouts.clone(),
            num_instances: self.num_instances.clone(),
        }
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        // Only shutdown when the LAST instance is dropped (follows tokio's pattern)
        // fetch_sub returns the value BEFORE decrementing
        if 1 == self.num_instances.fetch_sub(1, Ordering::AcqRel) {
            // This was the last instance - trigger shutdown
            self.shutdown_flag.store(true, Ordering::SeqCst);
            self.shutdown.notify_waiters();
            log::trace!("Event bus dropped (last instance), shutdown signal sent");
        }
    }
}
