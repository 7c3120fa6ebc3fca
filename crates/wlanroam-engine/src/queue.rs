//! Command queue / serializer.
//!
//! Owns every submitted command from `submit` to completion and enforces
//! the core ordering invariant: at most one active command per interface,
//! strict FIFO per interface for equal priority, and system-wide mutual
//! exclusion for AP lifecycle commands. The queue is a passive structure;
//! the engine drives activation and dispatch.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::debug;

use wlanroam_types::{CommandId, EngineError, InterfaceId, MacAddress, Result};

use crate::command::{CommandKind, Priority, QueuedCommand};

#[derive(Debug, Default)]
pub struct CommandQueue {
    next_id: u64,
    capacity: usize,
    active: HashMap<InterfaceId, QueuedCommand>,
    pending: HashMap<InterfaceId, VecDeque<QueuedCommand>>,
    /// Interfaces whose dispatch is held (firmware roam in flight)
    paused: HashSet<InterfaceId>,
}

impl CommandQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            next_id: 0,
            capacity,
            active: HashMap::new(),
            pending: HashMap::new(),
            paused: HashSet::new(),
        }
    }

    /// Allocate a fresh command id. Also used for synthesized completions
    /// that never correspond to a queued command.
    pub fn allocate_id(&mut self) -> CommandId {
        self.next_id += 1;
        CommandId(self.next_id)
    }

    fn total(&self) -> usize {
        self.active.len() + self.pending.values().map(VecDeque::len).sum::<usize>()
    }

    /// Append (or, for high priority, prepend) a command to its interface's
    /// pending list. Fails with NoResources when the pool is exhausted.
    pub fn submit(&mut self, command: QueuedCommand) -> Result<CommandId> {
        if self.total() >= self.capacity {
            return Err(EngineError::NoResources);
        }
        let id = command.id;
        let iface = command.interface_id;
        debug!(
            "queue submit: iface={} {} kind={} priority={:?}",
            iface,
            id,
            command.kind().name(),
            command.priority
        );
        let pending = self.pending.entry(iface).or_default();
        match command.priority {
            Priority::Normal => pending.push_back(command),
            Priority::High => pending.push_front(command),
        }
        Ok(id)
    }

    /// Promote the interface's front pending command to active, if nothing
    /// blocks it. Returns the promoted id; the caller dispatches it.
    pub fn try_activate(&mut self, interface_id: InterfaceId) -> Option<CommandId> {
        if self.paused.contains(&interface_id) || self.active.contains_key(&interface_id) {
            return None;
        }
        let front_kind = self.pending.get(&interface_id)?.front()?.kind();
        if front_kind.globally_exclusive()
            && self.active.values().any(|c| c.kind().globally_exclusive())
        {
            return None;
        }
        let command = self.pending.get_mut(&interface_id)?.pop_front()?;
        let id = command.id;
        debug!(
            "queue activate: iface={} {} kind={}",
            interface_id,
            id,
            front_kind.name()
        );
        self.active.insert(interface_id, command);
        Some(id)
    }

    pub fn active(&self, interface_id: InterfaceId) -> Option<&QueuedCommand> {
        self.active.get(&interface_id)
    }

    pub fn active_mut(&mut self, interface_id: InterfaceId) -> Option<&mut QueuedCommand> {
        self.active.get_mut(&interface_id)
    }

    pub fn active_id(&self, interface_id: InterfaceId) -> Option<CommandId> {
        self.active.get(&interface_id).map(|c| c.id)
    }

    /// Remove and return the interface's active command. Called exactly
    /// once per command by whichever handler finishes it.
    pub fn remove_active(&mut self, interface_id: InterfaceId) -> Option<QueuedCommand> {
        self.active.remove(&interface_id)
    }

    /// Is any command (active or pending) for the interface matched?
    pub fn has_matching<F>(&self, interface_id: InterfaceId, pred: F) -> bool
    where
        F: Fn(&QueuedCommand) -> bool,
    {
        if self.active.get(&interface_id).map(&pred).unwrap_or(false) {
            return true;
        }
        self.pending
            .get(&interface_id)
            .map(|p| p.iter().any(pred))
            .unwrap_or(false)
    }

    /// Id of an active or pending forced-teardown command targeting `peer`,
    /// used to coalesce duplicate teardown requests.
    pub fn find_teardown_for_peer(
        &self,
        interface_id: InterfaceId,
        peer: MacAddress,
    ) -> Option<CommandId> {
        if let Some(active) = self.active.get(&interface_id) {
            if active.command.teardown_peer() == Some(peer) {
                return Some(active.id);
            }
        }
        self.pending
            .get(&interface_id)?
            .iter()
            .find(|c| c.command.teardown_peer() == Some(peer))
            .map(|c| c.id)
    }

    /// True when a whole-interface disconnect is active or pending.
    pub fn has_disconnect(&self, interface_id: InterfaceId) -> bool {
        self.has_matching(interface_id, |c| c.kind() == CommandKind::Disconnect)
    }

    /// Remove everything targeting the interface: the active command (if
    /// any) and all pending ones, in that order. Used on interface destroy.
    pub fn drain_interface(&mut self, interface_id: InterfaceId) -> Vec<QueuedCommand> {
        let mut drained = Vec::new();
        if let Some(active) = self.active.remove(&interface_id) {
            drained.push(active);
        }
        if let Some(pending) = self.pending.remove(&interface_id) {
            drained.extend(pending);
        }
        self.paused.remove(&interface_id);
        drained
    }

    /// Interfaces that still have pending commands. Used to re-pump
    /// waiters once a globally exclusive command releases.
    pub fn interfaces_with_pending(&self) -> Vec<InterfaceId> {
        self.pending
            .iter()
            .filter(|(_, q)| !q.is_empty())
            .map(|(iface, _)| *iface)
            .collect()
    }

    /// Hold dispatch for the interface (active command unaffected).
    pub fn pause(&mut self, interface_id: InterfaceId) {
        debug!("queue paused: iface={}", interface_id);
        self.paused.insert(interface_id);
    }

    pub fn resume(&mut self, interface_id: InterfaceId) {
        if self.paused.remove(&interface_id) {
            debug!("queue resumed: iface={}", interface_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandOrigin, RoamCommand};
    use std::time::Duration;
    use wlanroam_types::ReasonCode;

    fn queued(queue: &mut CommandQueue, iface: InterfaceId, command: RoamCommand) -> QueuedCommand {
        QueuedCommand {
            id: queue.allocate_id(),
            interface_id: iface,
            command,
            priority: Priority::Normal,
            origin: CommandOrigin::User,
            timeout: Duration::from_secs(5),
            cursor: None,
        }
    }

    fn disconnect(queue: &mut CommandQueue, iface: InterfaceId) -> QueuedCommand {
        queued(
            queue,
            iface,
            RoamCommand::Disconnect {
                reason: ReasonCode::UNSPECIFIED,
            },
        )
    }

    #[test]
    fn test_one_active_per_interface_fifo() {
        let mut queue = CommandQueue::new(8);
        let if0 = InterfaceId(0);

        let first = disconnect(&mut queue, if0);
        let second = disconnect(&mut queue, if0);
        let first_id = queue.submit(first).unwrap();
        let second_id = queue.submit(second).unwrap();

        assert_eq!(queue.try_activate(if0), Some(first_id));
        // Second must wait for the first to complete.
        assert_eq!(queue.try_activate(if0), None);

        queue.remove_active(if0).unwrap();
        assert_eq!(queue.try_activate(if0), Some(second_id));
    }

    #[test]
    fn test_high_priority_jumps_queue() {
        let mut queue = CommandQueue::new(8);
        let if0 = InterfaceId(0);

        let normal = disconnect(&mut queue, if0);
        queue.submit(normal).unwrap();
        let mut urgent = disconnect(&mut queue, if0);
        urgent.priority = Priority::High;
        let urgent_id = urgent.id;
        queue.submit(urgent).unwrap();

        assert_eq!(queue.try_activate(if0), Some(urgent_id));
    }

    #[test]
    fn test_pool_exhaustion() {
        let mut queue = CommandQueue::new(1);
        let if0 = InterfaceId(0);

        let first = disconnect(&mut queue, if0);
        queue.submit(first).unwrap();
        let second = disconnect(&mut queue, if0);
        assert_eq!(queue.submit(second), Err(EngineError::NoResources));
    }

    #[test]
    fn test_globally_exclusive_blocks_across_interfaces() {
        let mut queue = CommandQueue::new(8);
        let if0 = InterfaceId(0);
        let if1 = InterfaceId(1);

        let ap0 = queued(&mut queue, if0, RoamCommand::StopAp);
        let ap0_id = ap0.id;
        queue.submit(ap0).unwrap();
        let ap1 = queued(&mut queue, if1, RoamCommand::StopAp);
        let ap1_id = ap1.id;
        queue.submit(ap1).unwrap();

        assert_eq!(queue.try_activate(if0), Some(ap0_id));
        // AP lifecycle is exclusive system-wide.
        assert_eq!(queue.try_activate(if1), None);

        // Once if0's AP command finishes, if1's may run.
        queue.remove_active(if0).unwrap();
        assert_eq!(queue.try_activate(if1), Some(ap1_id));
    }

    #[test]
    fn test_pause_holds_activation() {
        let mut queue = CommandQueue::new(8);
        let if0 = InterfaceId(0);

        let cmd = disconnect(&mut queue, if0);
        let id = cmd.id;
        queue.submit(cmd).unwrap();

        queue.pause(if0);
        assert_eq!(queue.try_activate(if0), None);
        queue.resume(if0);
        assert_eq!(queue.try_activate(if0), Some(id));
    }

    #[test]
    fn test_drain_interface() {
        let mut queue = CommandQueue::new(8);
        let if0 = InterfaceId(0);

        let a = disconnect(&mut queue, if0);
        let b = disconnect(&mut queue, if0);
        queue.submit(a).unwrap();
        queue.submit(b).unwrap();
        queue.try_activate(if0).unwrap();

        let drained = queue.drain_interface(if0);
        assert_eq!(drained.len(), 2);
        assert!(queue.active(if0).is_none());
        assert_eq!(queue.try_activate(if0), None);
    }
}
