//! Effect interpretation.
//!
//! [`Runtime::run_effect`] turns one effect descriptor into either an
//! immediate result or a pending [`EffectNode`]. Nodes live in an arena keyed
//! by [`EffectId`]; whoever completes the effect later (a dispatch, a channel
//! put, a timer, a waker, a settling task) calls [`Runtime::settle_effect`]
//! with that id, and a node that was already cancelled is simply not found.
//!
//! A node is `opening` while its own launch is still on the stack. Results
//! that arrive during that window are parked in `early` and returned as an
//! immediate result, so a saga never gets resumed re-entrantly.

use super::{Runtime, Settle, Wakeup};
use super::task::{Task, TaskLink};
use super::wake;
use crate::channel::{Channel, TakerId};
use crate::effect::{
    ActionChannelEffect, CallOutcome, CancelTarget, CpsCallback, CpsEffect, Effect, ForkEffect,
    LocalFuture, PutEffect, RaceEffect, TakeEffect, TakeSource, Targets,
};
use crate::error::{EffectError, SagaError};
use crate::saga;
use crate::tracing_compat::{debug, trace};
use crate::types::{CancelReason, EffectId, TaskId, TaskOutcome, Value};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;
use std::task::{Context, Poll};

/// Result of launching an effect.
#[derive(Debug)]
pub(crate) enum Launch {
    Immediate(Settle),
    Pending(EffectId),
}

/// Who receives an effect's result.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Parent {
    /// The yielding task's saga.
    Task,
    /// A branch of a `RACE` node.
    Race { node: EffectId, index: usize },
    /// A slot of an `ALL` node.
    All { node: EffectId, index: usize },
}

/// Completion state shared with a CPS callback.
#[derive(Debug, Default)]
pub(crate) struct CpsSlot {
    opening: bool,
    fired: bool,
    cancelled: bool,
    early: Option<Result<Value, SagaError>>,
}

pub(crate) enum NodeKind {
    /// Still being launched.
    Opening,
    BusTake,
    ChannelTake {
        channel: Channel,
        taker: Option<TakerId>,
    },
    /// A resolving `PUT` waiting for its dispatch job.
    Dispatch,
    Future(LocalFuture),
    Cps(Rc<RefCell<CpsSlot>>),
    /// A `CALL` driving a sub-saga.
    Call {
        sub: TaskId,
    },
    Timer,
    Join {
        targets: Vec<Task>,
        many: bool,
    },
    Race {
        branches: Vec<(String, Option<EffectId>)>,
    },
    All {
        slots: Vec<Option<Value>>,
        pending: Vec<Option<EffectId>>,
        remaining: usize,
    },
}

/// A pending effect.
pub(crate) struct EffectNode {
    task: TaskId,
    tag: &'static str,
    parent: Parent,
    kind: NodeKind,
    opening: bool,
    early: Option<Settle>,
}

/// What a take resolves with once its source has closed.
pub(crate) const fn end_settle(maybe: bool) -> Settle {
    if maybe {
        Settle::Ok(Value::End)
    } else {
        Settle::End
    }
}

fn take_settle(value: Value, maybe: bool) -> Settle {
    if value.is_end() {
        end_settle(maybe)
    } else {
        Settle::Ok(value)
    }
}

fn wrap_race(key: String, settle: Settle) -> Settle {
    match settle {
        Settle::Ok(value) => Settle::Ok(Value::keyed(key, value)),
        other => other,
    }
}

/// Checks whether a join can complete: the first failure or cancellation in
/// target order wins, otherwise every target must be done.
fn join_result(targets: &[Task], many: bool) -> Option<Settle> {
    let mut values = Vec::with_capacity(targets.len());
    let mut waiting = false;
    for target in targets {
        match target.outcome() {
            Some(TaskOutcome::Done(value)) => values.push(value),
            Some(TaskOutcome::Errored(err)) => return Some(Settle::Err(err)),
            Some(TaskOutcome::Cancelled(_)) => return Some(Settle::Err(SagaError::Cancelled)),
            None => waiting = true,
        }
    }
    if waiting {
        None
    } else if many {
        Some(Settle::Ok(Value::List(values)))
    } else {
        Some(Settle::Ok(values.pop().unwrap_or_default()))
    }
}

impl Runtime {
    /// Interprets one effect yielded by `task`.
    pub(crate) fn run_effect(&mut self, task: TaskId, effect: Effect, parent: Parent) -> Launch {
        let tag = effect.tag();
        self.stats.effects += 1;
        if self.config.trace_effects {
            debug!(task = %task, effect = tag, "effect triggered");
        } else {
            trace!(task = %task, effect = tag, "effect triggered");
        }
        if let Some(monitor) = self.monitor.as_deref() {
            monitor.effect_triggered(task, tag);
        }
        let launch = match effect {
            Effect::Take(take) => self.launch_take(task, take, parent),
            Effect::Put(put) => self.launch_put(task, put, parent),
            Effect::Call(call) => {
                let outcome = call.func.invoke(&call.context, call.args);
                self.launch_outcome(task, call.func.name(), outcome, parent)
            }
            Effect::Cps(cps) => self.launch_cps(task, cps, parent),
            Effect::Fork(fork) => Launch::Immediate(self.launch_fork(task, fork)),
            Effect::Join(targets) => self.launch_join(task, &targets, parent),
            Effect::Cancel(target) => Launch::Immediate(self.launch_cancel(task, &target)),
            Effect::Race(race) => self.launch_race(task, race, parent),
            Effect::All(effects) => self.launch_all(task, effects, parent),
            Effect::Select(select) => Launch::Immediate(Settle::Ok(
                select.selector.select(&self.store.state(), &select.args),
            )),
            Effect::ActionChannel(spec) => Launch::Immediate(self.launch_action_channel(spec)),
            Effect::Cancelled => Launch::Immediate(Settle::Ok(Value::from(self.is_cancelling(task)))),
            Effect::Flush(channel) => Launch::Immediate(Settle::Ok(channel.flush())),
        };
        if let Launch::Immediate(settle) = &launch {
            self.report_settled(task, tag, settle);
        }
        launch
    }

    /// Completes a pending effect and routes the result to its parent.
    pub(crate) fn settle_effect(&mut self, effect: EffectId, settle: Settle) {
        let Some(node) = self.effects.get_mut(effect.arena_index()) else {
            trace!(effect = %effect, "settle for a released effect ignored");
            return;
        };
        if node.opening {
            if node.early.is_none() {
                node.early = Some(settle);
            }
            return;
        }
        let Some(node) = self.effects.remove(effect.arena_index()) else {
            return;
        };
        self.report_settled(node.task, node.tag, &settle);
        self.route(effect, node.task, node.parent, settle);
    }

    /// Tears down a pending effect and everything it started.
    pub(crate) fn cancel_effect(&mut self, effect: EffectId, reason: &CancelReason) {
        let Some(node) = self.effects.remove(effect.arena_index()) else {
            return;
        };
        trace!(task = %node.task, effect = node.tag, reason = %reason, "effect cancelled");
        if let Some(monitor) = self.monitor.as_deref() {
            monitor.effect_cancelled(node.task, node.tag);
        }
        match node.kind {
            // Timers are skipped lazily when they fire.
            NodeKind::Opening | NodeKind::Dispatch | NodeKind::Timer => {}
            NodeKind::BusTake => {
                self.bus.remove_taker(effect);
            }
            NodeKind::ChannelTake { channel, taker } => {
                let withdrawn = taker.is_some_and(|id| channel.remove_taker(id));
                if !withdrawn {
                    self.requeue_undelivered(effect, &channel);
                }
            }
            NodeKind::Future(future) => drop(future),
            NodeKind::Cps(slot) => slot.borrow_mut().cancelled = true,
            NodeKind::Call { sub } => self.cancel_task(sub, reason.clone()),
            NodeKind::Join { targets, .. } => {
                for target in &targets {
                    self.unregister_joiner(target.id(), effect);
                }
            }
            NodeKind::Race { branches } => {
                for branch in branches.into_iter().filter_map(|(_, branch)| branch) {
                    self.cancel_effect(branch, reason);
                }
            }
            NodeKind::All { pending, .. } => {
                for branch in pending.into_iter().flatten() {
                    self.cancel_effect(branch, reason);
                }
            }
        }
    }

    /// Polls a future-backed `CALL` once.
    pub(crate) fn poll_effect_future(&mut self, effect: EffectId) {
        let waker = wake::effect_waker(&self.woken, effect);
        let mut cx = Context::from_waker(&waker);
        let poll = match self.effects.get_mut(effect.arena_index()) {
            Some(EffectNode {
                kind: NodeKind::Future(future),
                ..
            }) => future.as_mut().poll(&mut cx),
            _ => return,
        };
        if let Poll::Ready(result) = poll {
            self.settle_effect(effect, result.into());
        }
    }

    /// Re-checks a join after one of its targets settled.
    pub(crate) fn join_progress(&mut self, effect: EffectId) {
        let settle = match self.effects.get(effect.arena_index()) {
            Some(EffectNode {
                kind: NodeKind::Join { targets, many },
                ..
            }) => join_result(targets, *many),
            _ => None,
        };
        if let Some(settle) = settle {
            self.settle_effect(effect, settle);
        }
    }

    fn report_settled(&self, task: TaskId, tag: &'static str, settle: &Settle) {
        let Some(monitor) = self.monitor.as_deref() else {
            return;
        };
        match settle {
            Settle::Ok(value) => monitor.effect_resolved(task, tag, value),
            Settle::Err(err) => monitor.effect_rejected(task, tag, err),
            Settle::End => monitor.effect_resolved(task, tag, &Value::End),
        }
    }

    fn route(&mut self, effect: EffectId, task: TaskId, parent: Parent, settle: Settle) {
        match parent {
            Parent::Task => {
                let Some(record) = self.tasks.get_mut(task.arena_index()) else {
                    return;
                };
                if record.pending != Some(effect) {
                    return;
                }
                record.pending = None;
                self.drive(task, settle.into_resume());
            }
            Parent::Race { node, index } => self.race_branch_settled(node, index, settle),
            Parent::All { node, index } => self.all_branch_settled(node, index, settle),
        }
    }

    fn open_node(&mut self, task: TaskId, tag: &'static str, parent: Parent) -> EffectId {
        EffectId::from_arena(self.effects.insert(EffectNode {
            task,
            tag,
            parent,
            kind: NodeKind::Opening,
            opening: true,
            early: None,
        }))
    }

    fn set_kind(&mut self, effect: EffectId, kind: NodeKind) {
        if let Some(node) = self.effects.get_mut(effect.arena_index()) {
            node.kind = kind;
        }
    }

    /// Ends the opening window of a node.
    fn finish_opening(&mut self, effect: EffectId) -> Launch {
        let Some(node) = self.effects.get_mut(effect.arena_index()) else {
            return Launch::Immediate(Settle::Err(SagaError::Cancelled));
        };
        if let Some(settle) = node.early.take() {
            self.effects.remove(effect.arena_index());
            return Launch::Immediate(settle);
        }
        node.opening = false;
        Launch::Pending(effect)
    }

    fn requeue_undelivered(&mut self, effect: EffectId, channel: &Channel) {
        let wakeup = {
            let mut inbox = self.inbox.borrow_mut();
            inbox
                .iter()
                .position(|wakeup| wakeup.effect == effect)
                .and_then(|at| inbox.remove(at))
        };
        if let Some(Wakeup {
            settle: Settle::Ok(value),
            ..
        }) = wakeup
        {
            if !value.is_end() {
                trace!(effect = %effect, "returning undelivered value to channel");
                channel.requeue(value);
            }
        }
    }

    fn launch_take(&mut self, task: TaskId, take: TakeEffect, parent: Parent) -> Launch {
        let TakeEffect { source, maybe } = take;
        match source {
            TakeSource::Pattern(pattern) => {
                if self.bus.is_closed() {
                    return Launch::Immediate(end_settle(maybe));
                }
                let effect = self.open_node(task, "TAKE", parent);
                self.bus.add_taker(effect, pattern.compile(), maybe);
                self.set_kind(effect, NodeKind::BusTake);
                self.finish_opening(effect)
            }
            TakeSource::Channel(channel) => {
                if let Some(value) = channel.poll_take() {
                    return Launch::Immediate(take_settle(value, maybe));
                }
                let effect = self.open_node(task, "TAKE", parent);
                let inbox = Rc::clone(&self.inbox);
                let taker = channel.take(move |value| {
                    inbox.borrow_mut().push_back(Wakeup {
                        effect,
                        settle: take_settle(value, maybe),
                    });
                });
                self.set_kind(effect, NodeKind::ChannelTake { channel, taker });
                self.finish_opening(effect)
            }
        }
    }

    fn launch_put(&mut self, task: TaskId, put: PutEffect, parent: Parent) -> Launch {
        let PutEffect {
            action,
            channel,
            resolve,
        } = put;
        if let Some(channel) = channel {
            if channel.is_closed() && !action.is_end() {
                trace!(task = %task, channel = ?channel, "put to closed channel");
                return Launch::Immediate(if resolve {
                    Settle::Err(crate::error::ChannelError::Closed.into())
                } else {
                    Settle::Ok(Value::Unit)
                });
            }
            return Launch::Immediate(match channel.put(action) {
                Ok(()) => Settle::Ok(Value::Unit),
                Err(err) => Settle::Err(err.into()),
            });
        }
        match action {
            Value::End => {
                self.jobs.push_back(super::Job::End);
                Launch::Immediate(Settle::Ok(Value::Unit))
            }
            Value::Event(event) if resolve => {
                let effect = self.open_node(task, "PUT", parent);
                self.set_kind(effect, NodeKind::Dispatch);
                self.jobs.push_back(super::Job::Dispatch {
                    event,
                    reply: Some(effect),
                });
                self.finish_opening(effect)
            }
            Value::Event(event) => {
                self.jobs
                    .push_back(super::Job::Dispatch { event, reply: None });
                Launch::Immediate(Settle::Ok(Value::Unit))
            }
            other => Launch::Immediate(Settle::Err(EffectError::NotAnEvent(other.kind()).into())),
        }
    }

    fn launch_outcome(
        &mut self,
        task: TaskId,
        name: &str,
        outcome: CallOutcome,
        parent: Parent,
    ) -> Launch {
        match outcome {
            CallOutcome::Ready(result) => Launch::Immediate(result.into()),
            CallOutcome::Sleep(duration) => {
                let effect = self.open_node(task, "CALL", parent);
                self.timers.insert(effect, self.now + duration);
                self.set_kind(effect, NodeKind::Timer);
                self.finish_opening(effect)
            }
            CallOutcome::Future(future) => {
                let effect = self.open_node(task, "CALL", parent);
                self.set_kind(effect, NodeKind::Future(future));
                self.poll_effect_future(effect);
                self.finish_opening(effect)
            }
            CallOutcome::Saga(saga) => {
                let effect = self.open_node(task, "CALL", parent);
                let sub = self.create_task(name, Some(task), TaskLink::Call(effect), saga);
                self.set_kind(effect, NodeKind::Call { sub: sub.id() });
                self.drive(sub.id(), crate::saga::Resume::Start);
                self.finish_opening(effect)
            }
        }
    }

    fn launch_cps(&mut self, task: TaskId, cps: CpsEffect, parent: Parent) -> Launch {
        let effect = self.open_node(task, "CPS", parent);
        let slot = Rc::new(RefCell::new(CpsSlot {
            opening: true,
            ..CpsSlot::default()
        }));
        let callback = {
            let slot = Rc::clone(&slot);
            let inbox = Rc::clone(&self.inbox);
            CpsCallback::new(move |result| {
                let mut state = slot.borrow_mut();
                if state.fired || state.cancelled {
                    return;
                }
                state.fired = true;
                if state.opening {
                    state.early = Some(result);
                } else {
                    drop(state);
                    inbox.borrow_mut().push_back(Wakeup {
                        effect,
                        settle: result.into(),
                    });
                }
            })
        };
        cps.func.invoke(&cps.context, cps.args, callback);
        let early = {
            let mut state = slot.borrow_mut();
            state.opening = false;
            state.early.take()
        };
        if let Some(result) = early {
            self.effects.remove(effect.arena_index());
            return Launch::Immediate(result.into());
        }
        self.set_kind(effect, NodeKind::Cps(slot));
        self.finish_opening(effect)
    }

    fn launch_fork(&mut self, task: TaskId, fork: ForkEffect) -> Settle {
        let ForkEffect {
            context,
            func,
            args,
            detached,
        } = fork;
        let name = func.name().to_owned();
        let saga = saga::deferred(func, context, args);
        let link = if detached {
            TaskLink::Detached
        } else {
            TaskLink::Attached
        };
        let child = self.create_task(&name, Some(task), link, saga);
        if !detached {
            if let Some(record) = self.tasks.get_mut(task.arena_index()) {
                record.children.push(child.id());
            }
        }
        self.schedule_start(child.id());
        Settle::Ok(Value::Task(child))
    }

    fn launch_join(&mut self, task: TaskId, targets: &Targets, parent: Parent) -> Launch {
        let many = matches!(targets, Targets::Many(_));
        let targets = targets.as_slice().to_vec();
        if targets.iter().any(|target| target.id() == task) {
            return Launch::Immediate(Settle::Err(EffectError::SelfJoin.into()));
        }
        if let Some(settle) = join_result(&targets, many) {
            return Launch::Immediate(settle);
        }
        let effect = self.open_node(task, "JOIN", parent);
        for target in &targets {
            if let Some(record) = self.tasks.get_mut(target.id().arena_index()) {
                record.joiners.push(effect);
            }
        }
        self.set_kind(effect, NodeKind::Join { targets, many });
        self.finish_opening(effect)
    }

    fn launch_cancel(&mut self, task: TaskId, target: &CancelTarget) -> Settle {
        match target {
            CancelTarget::SelfTask => self.cancel_task(task, CancelReason::user("self cancel")),
            CancelTarget::Tasks(targets) => {
                for target in targets.as_slice() {
                    self.cancel_task(target.id(), CancelReason::user("cancel effect"));
                }
            }
        }
        Settle::Ok(Value::Unit)
    }

    fn launch_race(&mut self, task: TaskId, race: RaceEffect, parent: Parent) -> Launch {
        let RaceEffect { branches } = race;
        if branches.is_empty() {
            return Launch::Immediate(Settle::Err(EffectError::EmptyRace.into()));
        }
        let mut keys = BTreeSet::new();
        for (key, _) in &branches {
            if !keys.insert(key.as_str()) {
                return Launch::Immediate(Settle::Err(
                    EffectError::DuplicateRaceKey(key.clone()).into(),
                ));
            }
        }
        let node = self.open_node(task, "RACE", parent);
        self.set_kind(
            node,
            NodeKind::Race {
                branches: Vec::with_capacity(branches.len()),
            },
        );
        for (index, (key, effect)) in branches.into_iter().enumerate() {
            match self.run_effect(task, effect, Parent::Race { node, index }) {
                Launch::Immediate(settle) => {
                    return self.close_race_early(node, wrap_race(key, settle));
                }
                Launch::Pending(branch) => {
                    if let Some(EffectNode {
                        kind: NodeKind::Race { branches },
                        ..
                    }) = self.effects.get_mut(node.arena_index())
                    {
                        branches.push((key, Some(branch)));
                    }
                }
            }
            let early = self
                .effects
                .get_mut(node.arena_index())
                .and_then(|race| race.early.take());
            if let Some(settle) = early {
                return self.close_race_early(node, settle);
            }
        }
        self.finish_opening(node)
    }

    /// Resolves a race that settled while its branches were being launched.
    fn close_race_early(&mut self, node: EffectId, settle: Settle) -> Launch {
        if let Some(EffectNode {
            kind: NodeKind::Race { branches },
            ..
        }) = self.effects.remove(node.arena_index())
        {
            self.cancel_losers(branches);
        }
        Launch::Immediate(settle)
    }

    fn cancel_losers(&mut self, branches: Vec<(String, Option<EffectId>)>) {
        let reason = CancelReason::race_lost();
        for (key, branch) in branches {
            if let Some(branch) = branch {
                trace!(branch = %key, "cancelling race loser");
                self.cancel_effect(branch, &reason);
            }
        }
    }

    fn race_branch_settled(&mut self, node: EffectId, index: usize, settle: Settle) {
        let Some(race) = self.effects.get_mut(node.arena_index()) else {
            return;
        };
        let EffectNode {
            kind: NodeKind::Race { branches },
            opening,
            early,
            ..
        } = race
        else {
            return;
        };
        let Some((key, slot)) = branches.get_mut(index) else {
            return;
        };
        *slot = None;
        let settle = wrap_race(key.clone(), settle);
        if *opening {
            if early.is_none() {
                *early = Some(settle);
            }
            return;
        }
        let Some(race) = self.effects.remove(node.arena_index()) else {
            return;
        };
        if let NodeKind::Race { branches } = race.kind {
            self.cancel_losers(branches);
        }
        self.report_settled(race.task, race.tag, &settle);
        self.route(node, race.task, race.parent, settle);
    }

    fn launch_all(&mut self, task: TaskId, effects: Vec<Effect>, parent: Parent) -> Launch {
        if effects.is_empty() {
            return Launch::Immediate(Settle::Ok(Value::List(Vec::new())));
        }
        let count = effects.len();
        let node = self.open_node(task, "ALL", parent);
        self.set_kind(
            node,
            NodeKind::All {
                slots: vec![None; count],
                pending: vec![None; count],
                remaining: count,
            },
        );
        for (index, effect) in effects.into_iter().enumerate() {
            let launch = self.run_effect(task, effect, Parent::All { node, index });
            let Some(all) = self.effects.get_mut(node.arena_index()) else {
                return Launch::Immediate(Settle::Err(SagaError::Cancelled));
            };
            let EffectNode {
                kind:
                    NodeKind::All {
                        slots,
                        pending,
                        remaining,
                    },
                early,
                ..
            } = all
            else {
                return Launch::Immediate(Settle::Err(SagaError::Cancelled));
            };
            match launch {
                Launch::Immediate(Settle::Ok(value)) => {
                    slots[index] = Some(value);
                    *remaining -= 1;
                }
                Launch::Immediate(failure) => return self.close_all_early(node, failure),
                Launch::Pending(branch) => pending[index] = Some(branch),
            }
            if let Some(failure) = early.take() {
                return self.close_all_early(node, failure);
            }
        }
        let complete = matches!(
            self.effects.get(node.arena_index()),
            Some(EffectNode {
                kind: NodeKind::All { remaining: 0, .. },
                ..
            })
        );
        if complete {
            if let Some(EffectNode {
                kind: NodeKind::All { slots, .. },
                ..
            }) = self.effects.remove(node.arena_index())
            {
                return Launch::Immediate(Settle::Ok(Value::List(
                    slots.into_iter().flatten().collect(),
                )));
            }
        }
        self.finish_opening(node)
    }

    /// Fails an `ALL` while it is still launching, cancelling what started.
    fn close_all_early(&mut self, node: EffectId, failure: Settle) -> Launch {
        if let Some(EffectNode {
            kind: NodeKind::All { pending, .. },
            ..
        }) = self.effects.remove(node.arena_index())
        {
            let reason = CancelReason::sibling_failed();
            for branch in pending.into_iter().flatten() {
                self.cancel_effect(branch, &reason);
            }
        }
        Launch::Immediate(failure)
    }

    fn all_branch_settled(&mut self, node: EffectId, index: usize, settle: Settle) {
        let Some(all) = self.effects.get_mut(node.arena_index()) else {
            return;
        };
        let EffectNode {
            kind:
                NodeKind::All {
                    slots,
                    pending,
                    remaining,
                },
            opening,
            early,
            ..
        } = all
        else {
            return;
        };
        if let Some(slot) = pending.get_mut(index) {
            *slot = None;
        }
        let settle = match settle {
            Settle::Ok(value) => {
                if let Some(slot) = slots.get_mut(index) {
                    *slot = Some(value);
                }
                *remaining = remaining.saturating_sub(1);
                if *remaining > 0 || *opening {
                    return;
                }
                Settle::Ok(Value::List(slots.iter_mut().filter_map(Option::take).collect()))
            }
            failure => {
                if *opening {
                    if early.is_none() {
                        *early = Some(failure);
                    }
                    return;
                }
                failure
            }
        };
        let Some(all) = self.effects.remove(node.arena_index()) else {
            return;
        };
        if let NodeKind::All { pending, .. } = all.kind {
            let reason = CancelReason::sibling_failed();
            for branch in pending.into_iter().flatten() {
                self.cancel_effect(branch, &reason);
            }
        }
        self.report_settled(all.task, all.tag, &settle);
        self.route(node, all.task, all.parent, settle);
    }

    fn launch_action_channel(&mut self, spec: ActionChannelEffect) -> Settle {
        let ActionChannelEffect { pattern, buffer } = spec;
        let channel = Channel::with_policy(buffer.unwrap_or(self.config.action_buffer));
        if self.bus.is_closed() {
            channel.close();
        } else {
            self.bus.subscribe(pattern.compile(), channel.clone());
        }
        Settle::Ok(Value::Channel(channel))
    }
}
