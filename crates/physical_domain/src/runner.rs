//! # Domain Thread
//!
//! Hosts a [`PhysicalDomain`] on a dedicated thread and ticks it at the configured tick
//! size.
//!
//! # Design
//! - **Exclusive ownership**: the thread owns the domain for as long as it runs and hands
//!   it back from [`DomainThread::stop`].
//! - **Channels in and out**: commands arrive over a `crossbeam-channel`; notifications
//!   produced by commands and ticks are forwarded over another one.
//! - **Fixed timestep**: elapsed wall time is accumulated and consumed in whole ticks, at
//!   most five per wake-up.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};

use crate::domain::{PhysicalDomain, TransformData};
use crate::entity::{BBox, Entity, EntityId, PropertyValue};
use crate::error::DomainError;
use crate::mode::Mode;
use crate::notify::Notification;

/// A mutation queued for the domain thread.
#[derive(Debug, Clone)]
pub enum DomainCommand {
    Add(Entity),
    Remove(EntityId),
    Transform(EntityId, TransformData),
    SetProperty(EntityId, String, PropertyValue),
    SetMode(EntityId, Mode),
    SetBBox(EntityId, BBox),
    SetPerceptive(EntityId, bool),
}

impl DomainCommand {
    fn apply(self, domain: &mut PhysicalDomain) {
        match self {
            DomainCommand::Add(entity) => domain.add_entity(entity),
            DomainCommand::Remove(id) => domain.remove_entity(id),
            DomainCommand::Transform(id, data) => domain.apply_transform(id, data),
            DomainCommand::SetProperty(id, name, value) => domain.set_property(id, &name, value),
            DomainCommand::SetMode(id, mode) => domain.set_mode(id, mode),
            DomainCommand::SetBBox(id, bbox) => domain.set_bbox(id, bbox),
            DomainCommand::SetPerceptive(id, perceptive) => domain.set_perceptive(id, perceptive),
        }
    }
}

pub struct DomainThread {
    domain: Option<PhysicalDomain>,
    enabled: Arc<AtomicBool>,
    tick_count: Arc<AtomicU64>,
    commands: Sender<DomainCommand>,
    command_rx: Receiver<DomainCommand>,
    notifications: Sender<Notification>,
    thread_handle: Option<thread::JoinHandle<PhysicalDomain>>,
}

impl DomainThread {
    /// Wraps a domain. The returned receiver yields every notification the domain emits
    /// once the thread is running.
    pub fn new(domain: PhysicalDomain) -> (Self, Receiver<Notification>) {
        let (commands, command_rx) = crossbeam_channel::unbounded();
        let (notifications, notification_rx) = crossbeam_channel::unbounded();
        tracing::debug!(
            "[DOMAIN-THREAD] Created for domain {} (tick size {:.4}s)",
            domain.container_id(),
            domain.config().tick_size
        );
        (
            Self {
                domain: Some(domain),
                enabled: Arc::new(AtomicBool::new(false)),
                tick_count: Arc::new(AtomicU64::new(0)),
                commands,
                command_rx,
                notifications,
                thread_handle: None,
            },
            notification_rx,
        )
    }

    /// Sender for queuing commands; may be cloned freely.
    pub fn commands(&self) -> Sender<DomainCommand> {
        self.commands.clone()
    }

    pub fn send(&self, command: DomainCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle.is_some() && self.enabled.load(Ordering::Relaxed)
    }

    pub fn start(&mut self) -> Result<(), DomainError> {
        let Some(mut domain) = self.domain.take() else {
            tracing::warn!("[DOMAIN-THREAD] Already running");
            return Ok(());
        };
        let enabled = self.enabled.clone();
        let tick_count = self.tick_count.clone();
        let commands = self.command_rx.clone();
        let notifications = self.notifications.clone();
        let tick_size = domain.config().tick_size;
        enabled.store(true, Ordering::Relaxed);

        let handle = thread::Builder::new()
            .name(format!("Physical Domain {}", domain.container_id()))
            .spawn(move || {
                tracing::debug!("[DOMAIN-THREAD] 🚀 Thread spawned successfully!");
                let target_frame_time = Duration::from_secs_f64(tick_size);
                let mut last_tick = Instant::now();
                let mut accumulated_time = Duration::ZERO;

                let forward = |domain: &mut PhysicalDomain| {
                    for notification in domain.drain_notifications() {
                        // Nobody listening is not an error.
                        let _ = notifications.send(notification);
                    }
                };

                loop {
                    if !enabled.load(Ordering::Relaxed) {
                        tracing::debug!("[DOMAIN-THREAD] Thread disabled, exiting loop");
                        break;
                    }
                    let frame_start = Instant::now();
                    accumulated_time += frame_start - last_tick;
                    last_tick = frame_start;

                    for command in commands.try_iter() {
                        command.apply(&mut domain);
                    }
                    forward(&mut domain);

                    let max_steps = 5; // Prevent spiral of death
                    let mut steps = 0;
                    while accumulated_time >= target_frame_time && steps < max_steps {
                        domain.tick(tick_size);
                        forward(&mut domain);
                        accumulated_time -= target_frame_time;
                        steps += 1;
                        tick_count.fetch_add(1, Ordering::Relaxed);
                    }
                    if steps == max_steps && accumulated_time >= target_frame_time {
                        tracing::warn!(
                            "[DOMAIN-THREAD] Falling behind, dropping {:?} of simulation time",
                            accumulated_time
                        );
                        accumulated_time = Duration::ZERO;
                    }

                    let frame_time = frame_start.elapsed();
                    if frame_time < target_frame_time {
                        thread::sleep(target_frame_time - frame_time);
                    }
                }

                for command in commands.try_iter() {
                    command.apply(&mut domain);
                }
                forward(&mut domain);
                tracing::debug!("[DOMAIN-THREAD] Stopped");
                domain
            })
            .map_err(|e| DomainError::ThreadSpawn(e.to_string()))?;

        self.thread_handle = Some(handle);
        tracing::info!("✓ Domain thread started");
        Ok(())
    }

    /// Stops the thread and returns the domain it was running.
    pub fn stop(&mut self) -> Result<Option<PhysicalDomain>, DomainError> {
        self.enabled.store(false, Ordering::Relaxed);
        let Some(handle) = self.thread_handle.take() else {
            return Ok(self.domain.take());
        };
        let domain = handle.join().map_err(|_| DomainError::ThreadPanicked)?;
        tracing::debug!("[DOMAIN-THREAD] Joined after {} ticks", self.tick_count());
        Ok(Some(domain))
    }
}

impl Drop for DomainThread {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            tracing::warn!("[DOMAIN-THREAD] {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DomainConfig;

    fn domain() -> PhysicalDomain {
        let container = Entity::new(0).with_bbox([-32.0, 0.0, -32.0], [32.0, 32.0, 32.0]);
        let config = DomainConfig {
            tick_size: 0.01,
            ..DomainConfig::default()
        };
        PhysicalDomain::new(container, config)
    }

    #[test]
    fn test_thread_runs_commands_and_returns_domain() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let (mut runner, notifications) = DomainThread::new(domain());
        runner.start().unwrap();
        assert!(runner.is_running());

        runner.send(DomainCommand::Add(
            Entity::new(1)
                .with_pos(0.0, 5.0, 0.0)
                .with_bbox([-0.5, 0.0, -0.5], [0.5, 1.0, 0.5])
                .with_property("mass", 1.0)
                .perceptive(),
        ));
        let first = notifications.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(first.recipient(), EntityId(1));

        let deadline = Instant::now() + Duration::from_secs(5);
        while runner.tick_count() < 5 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        let domain = runner.stop().unwrap().unwrap();
        assert!(!runner.is_running());
        assert!(domain.contains(EntityId(1)));
        assert!(domain.simulated_time() > 0.0);
    }

    #[test]
    fn test_stop_without_start_returns_domain() {
        let (mut runner, _notifications) = DomainThread::new(domain());
        let domain = runner.stop().unwrap();
        assert!(domain.is_some());
        assert!(runner.stop().unwrap().is_none());
    }
}
