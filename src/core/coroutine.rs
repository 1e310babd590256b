//! Coroutine engine
//!
//! A coroutine is a resumable step sequence owned by a behavior. Each call
//! to [`Sequence::resume`] runs the sequence up to its next suspension
//! point and yields a [`Wait`] describing when to resume, or reports
//! [`Step::Done`].
//!
//! Registration drives the sequence through its first suspension point
//! immediately, so a sequence that never suspends is complete before
//! [`Scene::start_coroutine`] returns. After that the engine advances
//! coroutines once per frame, strictly between the tick and late-tick
//! phases.
//!
//! A coroutine is reclaimed — never resumed again — when its sequence
//! finishes, its owner is destroyed or disabled, or it is stopped
//! explicitly. Stops mark the coroutine done immediately; the slot is
//! reclaimed on the engine's next pass rather than mid-pass.
//!
//! Yielding a nested sequence trampolines: the inner sequence is
//! registered as its own coroutine (and driven through its first
//! suspension point), and the outer coroutine waits on the inner one's
//! done flag before advancing past the yield.

use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::core::Scene;
use crate::ecs::{ComponentId, Context, CoroutineId, LifecycleState, World};

/// Result of resuming a sequence.
pub enum Step {
    /// Suspend until the wait elapses.
    Yield(Wait),
    /// The sequence is exhausted.
    Done,
}

/// Typed suspension points.
pub enum Wait {
    /// Resume on the engine's next pass.
    Tick,
    /// Resume once this much scaled time has elapsed.
    Seconds(f32),
    /// Resume on the next pass. Sub-frame ordering relative to the fixed
    /// cadence is out of scope.
    FixedTick,
    /// Resume on the next pass, after the current frame completes.
    EndOfFrame,
    /// Run a nested sequence to completion before resuming.
    Sequence(Box<dyn Sequence>),
    /// Resume once another coroutine reports done.
    Join(CoroutineId),
    /// Poll a predicate every pass; resume once it returns true.
    Until(Box<dyn FnMut(&World) -> bool>),
}

impl Wait {
    /// Wait for `seconds` of scaled time.
    #[must_use]
    pub fn seconds(seconds: f32) -> Self {
        Self::Seconds(seconds)
    }

    /// Wait until `predicate` returns true.
    #[must_use]
    pub fn until(predicate: impl FnMut(&World) -> bool + 'static) -> Self {
        Self::Until(Box::new(predicate))
    }

    /// Run `sequence` as a nested coroutine, then resume.
    #[must_use]
    pub fn sequence(sequence: impl Sequence) -> Self {
        Self::Sequence(Box::new(sequence))
    }
}

/// A resumable step sequence.
///
/// Each `resume` call runs to the next suspension point. Sequences carry
/// their own position (typically a step counter or small state machine)
/// across calls.
pub trait Sequence: 'static {
    /// Run up to the next suspension point.
    fn resume(&mut self, ctx: &mut Context) -> Step;
}

/// Runtime wait state, derived from the last yielded [`Wait`].
pub(crate) enum WaitState {
    Ready,
    Timer(f32),
    Join(CoroutineId),
    Until(Box<dyn FnMut(&World) -> bool>),
}

struct Coroutine {
    seq: Box<dyn Sequence>,
    wait: WaitState,
}

struct CoroutineSlot {
    generation: u32,
    live: bool,
    done: bool,
    owner: ComponentId,
    /// `None` while the coroutine is checked out for a resume.
    co: Option<Coroutine>,
}

/// Slot arena for running coroutines, owned by the scene.
#[derive(Default)]
pub(crate) struct CoroutineEngine {
    slots: Vec<CoroutineSlot>,
    free: Vec<u32>,
    order: Vec<CoroutineId>,
}

impl CoroutineEngine {
    fn insert(&mut self, owner: ComponentId, seq: Box<dyn Sequence>) -> CoroutineId {
        let co = Coroutine {
            seq,
            wait: WaitState::Ready,
        };
        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.live = true;
                slot.done = false;
                slot.owner = owner;
                slot.co = Some(co);
                CoroutineId::new(index, slot.generation)
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(CoroutineSlot {
                    generation: 0,
                    live: true,
                    done: false,
                    owner,
                    co: Some(co),
                });
                CoroutineId::new(index, 0)
            }
        };
        self.order.push(id);
        id
    }

    fn slot(&self, id: CoroutineId) -> Option<&CoroutineSlot> {
        let slot = self.slots.get(id.index() as usize)?;
        (slot.generation == id.generation() && slot.live).then_some(slot)
    }

    fn slot_mut(&mut self, id: CoroutineId) -> Option<&mut CoroutineSlot> {
        let slot = self.slots.get_mut(id.index() as usize)?;
        (slot.generation == id.generation() && slot.live).then_some(slot)
    }

    fn remove(&mut self, id: CoroutineId) {
        let Some(slot) = self.slot_mut(id) else {
            return;
        };
        slot.live = false;
        slot.done = true;
        slot.co = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index());
    }

    fn compact_order(&mut self) {
        let slots = &self.slots;
        self.order.retain(|id| {
            slots
                .get(id.index() as usize)
                .is_some_and(|slot| slot.generation == id.generation() && slot.live)
        });
    }

    fn order_snapshot(&self) -> Vec<CoroutineId> {
        self.order.clone()
    }

    /// Done, owner for a live slot.
    fn peek(&self, id: CoroutineId) -> Option<(bool, ComponentId)> {
        self.slot(id).map(|slot| (slot.done, slot.owner))
    }

    /// A reclaimed or finished coroutine reads as done.
    pub fn is_done(&self, id: CoroutineId) -> bool {
        self.slot(id).is_none_or(|slot| slot.done)
    }

    pub fn stop(&mut self, id: CoroutineId) {
        if let Some(slot) = self.slot_mut(id) {
            slot.done = true;
        }
    }

    pub fn stop_all_for(&mut self, owner: ComponentId) {
        for slot in &mut self.slots {
            if slot.live && slot.owner == owner {
                slot.done = true;
            }
        }
    }

    fn checkout(&mut self, id: CoroutineId) -> Option<(ComponentId, Coroutine)> {
        let slot = self.slot_mut(id)?;
        if slot.done {
            return None;
        }
        let co = slot.co.take()?;
        Some((slot.owner, co))
    }

    fn commit(&mut self, id: CoroutineId, mut co: Coroutine, wait: WaitState, done: bool) {
        let Some(slot) = self.slot_mut(id) else {
            return;
        };
        co.wait = wait;
        slot.co = Some(co);
        if done {
            slot.done = true;
        }
    }

    fn take_wait(&mut self, id: CoroutineId) -> Option<WaitState> {
        let co = self.slot_mut(id)?.co.as_mut()?;
        Some(std::mem::replace(&mut co.wait, WaitState::Ready))
    }

    fn put_wait(&mut self, id: CoroutineId, wait: WaitState) {
        if let Some(slot) = self.slot_mut(id)
            && let Some(co) = slot.co.as_mut()
        {
            co.wait = wait;
        }
    }

    #[cfg(test)]
    fn live_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.live).count()
    }
}

impl Scene {
    /// Start a coroutine owned by a behavior.
    ///
    /// The sequence is driven through its first suspension point before
    /// this returns; a sequence with no suspension points completes
    /// immediately. Returns `None` (with a warning) if `owner` is not a
    /// live behavior.
    pub fn start_coroutine<S: Sequence>(
        &mut self,
        owner: ComponentId,
        sequence: S,
    ) -> Option<CoroutineId> {
        self.start_boxed_coroutine(owner, Box::new(sequence))
    }

    /// Boxed variant of [`Scene::start_coroutine`].
    pub fn start_boxed_coroutine(
        &mut self,
        owner: ComponentId,
        sequence: Box<dyn Sequence>,
    ) -> Option<CoroutineId> {
        if self.world.behavior_cell(owner).is_none() {
            log::warn!("start_coroutine on a dead or non-behavior component; ignoring");
            return None;
        }
        let id = self.coroutines.insert(owner, sequence);
        self.resume_coroutine(id);
        Some(id)
    }

    /// Mark a coroutine done. It never resumes; the slot is reclaimed on
    /// the engine's next pass.
    pub fn stop_coroutine(&mut self, id: CoroutineId) {
        self.coroutines.stop(id);
    }

    /// Mark every coroutine owned by a behavior done.
    pub fn stop_all_coroutines(&mut self, owner: ComponentId) {
        self.coroutines.stop_all_for(owner);
    }

    /// Whether a coroutine has finished. Reclaimed and unknown handles
    /// read as done.
    #[must_use]
    pub fn coroutine_done(&self, id: CoroutineId) -> bool {
        self.coroutines.is_done(id)
    }

    /// Engine pass: phase 5 of the scheduler.
    pub(crate) fn advance_coroutines(&mut self, dt: f32) {
        enum Decision {
            Skip,
            Resume,
            Join(CoroutineId),
            Predicate,
        }

        // Reclaim finished coroutines and those whose owner is destroyed
        // or disabled. Pruning happens before any resumption, so a stopped
        // coroutine never runs another step.
        let order = self.coroutines.order_snapshot();
        for &id in &order {
            let Some((done, owner)) = self.coroutines.peek(id) else {
                continue;
            };
            let owner_enabled = self
                .world
                .behavior_cell(owner)
                .is_some_and(|cell| cell.state == LifecycleState::Enabled);
            if done || !owner_enabled {
                self.coroutines.remove(id);
            }
        }
        self.coroutines.compact_order();

        for &id in &order {
            let decision = match self.coroutines.slot_mut(id) {
                None => continue,
                Some(slot) => {
                    if slot.done {
                        continue;
                    }
                    match slot.co.as_mut() {
                        None => continue,
                        Some(co) => match &mut co.wait {
                            WaitState::Ready => Decision::Resume,
                            WaitState::Timer(remaining) => {
                                *remaining -= dt;
                                if *remaining <= 0.0 {
                                    Decision::Resume
                                } else {
                                    Decision::Skip
                                }
                            }
                            WaitState::Join(target) => Decision::Join(*target),
                            WaitState::Until(_) => Decision::Predicate,
                        },
                    }
                }
            };

            let resume = match decision {
                Decision::Skip => false,
                Decision::Resume => true,
                Decision::Join(target) => self.coroutines.is_done(target),
                Decision::Predicate => self.poll_predicate(id),
            };
            if resume {
                self.resume_coroutine(id);
            }
        }
    }

    /// Poll an `Until` predicate with the world, putting it back if it has
    /// not fired yet.
    fn poll_predicate(&mut self, id: CoroutineId) -> bool {
        let mut predicate = match self.coroutines.take_wait(id) {
            Some(WaitState::Until(predicate)) => predicate,
            Some(other) => {
                self.coroutines.put_wait(id, other);
                return false;
            }
            None => return false,
        };
        let fired = predicate(&self.world);
        if !fired {
            self.coroutines.put_wait(id, WaitState::Until(predicate));
        }
        fired
    }

    /// Run one step of a coroutine with panic isolation and interpret the
    /// yielded wait.
    pub(crate) fn resume_coroutine(&mut self, id: CoroutineId) {
        let Some((owner, mut co)) = self.coroutines.checkout(id) else {
            return;
        };
        let Some(entity) = self.world.owner_of(owner) else {
            self.coroutines.commit(id, co, WaitState::Ready, true);
            return;
        };
        let Some(transform) = self.world.transform_of(entity) else {
            self.coroutines.commit(id, co, WaitState::Ready, true);
            return;
        };

        let step = {
            let mut ctx = Context {
                scene: self,
                entity,
                this: owner,
                transform,
            };
            catch_unwind(AssertUnwindSafe(|| co.seq.resume(&mut ctx)))
        };

        let (wait, done) = match step {
            Err(_) => {
                log::error!("coroutine owned by component {owner:?} panicked; stopping it");
                (WaitState::Ready, true)
            }
            Ok(Step::Done) => (WaitState::Ready, true),
            Ok(Step::Yield(yielded)) => match yielded {
                Wait::Tick | Wait::FixedTick | Wait::EndOfFrame => (WaitState::Ready, false),
                Wait::Seconds(seconds) => (WaitState::Timer(seconds.max(0.0)), false),
                Wait::Join(target) => (WaitState::Join(target), false),
                Wait::Until(predicate) => (WaitState::Until(predicate), false),
                Wait::Sequence(nested) => {
                    // Trampoline: the nested sequence becomes its own
                    // coroutine, driven through its first suspension point
                    // right away; the parent joins on it.
                    let child = self.coroutines.insert(owner, nested);
                    self.resume_coroutine(child);
                    (WaitState::Join(child), false)
                }
            },
        };
        self.coroutines.commit(id, co, wait, done);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::ecs::Behavior;

    /// Inert behavior to own coroutines in tests.
    struct Host;

    impl Behavior for Host {
        fn name(&self) -> &'static str {
            "Host"
        }
    }

    fn scene_with_host() -> (Scene, ComponentId) {
        let mut scene = Scene::new();
        let e = scene.create_entity("host");
        let id = scene.add_behavior(e, Host).unwrap();
        (scene, id)
    }

    /// Sets a flag and finishes without ever suspending.
    struct Immediate {
        flag: Rc<Cell<bool>>,
    }

    impl Sequence for Immediate {
        fn resume(&mut self, _ctx: &mut Context) -> Step {
            self.flag.set(true);
            Step::Done
        }
    }

    #[test]
    fn test_never_suspending_sequence_completes_before_start_returns() {
        let (mut scene, host) = scene_with_host();
        let flag = Rc::new(Cell::new(false));

        let id = scene
            .start_coroutine(host, Immediate { flag: Rc::clone(&flag) })
            .unwrap();

        assert!(flag.get());
        assert!(scene.coroutine_done(id));
    }

    /// Waits a fixed duration, then sets a flag.
    struct DelayedFlag {
        flag: Rc<Cell<bool>>,
        seconds: f32,
        step: u8,
    }

    impl Sequence for DelayedFlag {
        fn resume(&mut self, _ctx: &mut Context) -> Step {
            match self.step {
                0 => {
                    self.step = 1;
                    Step::Yield(Wait::seconds(self.seconds))
                }
                _ => {
                    self.flag.set(true);
                    Step::Done
                }
            }
        }
    }

    #[test]
    fn test_duration_wait_elapses_on_scaled_time() {
        let (mut scene, host) = scene_with_host();
        let flag = Rc::new(Cell::new(false));
        scene
            .start_coroutine(host, DelayedFlag { flag: Rc::clone(&flag), seconds: 1.0, step: 0 })
            .unwrap();

        scene.tick(0.5);
        assert!(!flag.get());

        scene.tick(0.6);
        assert!(flag.get());
    }

    /// Counts how many passes it has resumed on.
    struct TickCounter {
        count: Rc<Cell<u32>>,
    }

    impl Sequence for TickCounter {
        fn resume(&mut self, _ctx: &mut Context) -> Step {
            self.count.set(self.count.get() + 1);
            Step::Yield(Wait::Tick)
        }
    }

    #[test]
    fn test_stop_all_for_owner_never_resumes_again() {
        let (mut scene, host) = scene_with_host();
        let count = Rc::new(Cell::new(0));
        let id = scene
            .start_coroutine(host, TickCounter { count: Rc::clone(&count) })
            .unwrap();

        scene.tick(0.016);
        let after_one_frame = count.get();
        assert!(after_one_frame >= 1);

        scene.stop_all_coroutines(host);
        assert!(scene.coroutine_done(id));
        for _ in 0..3 {
            scene.tick(0.016);
        }
        assert_eq!(count.get(), after_one_frame);
    }

    #[test]
    fn test_stop_by_handle_mid_wait() {
        let (mut scene, host) = scene_with_host();
        let flag = Rc::new(Cell::new(false));
        let id = scene
            .start_coroutine(host, DelayedFlag { flag: Rc::clone(&flag), seconds: 0.5, step: 0 })
            .unwrap();

        scene.stop_coroutine(id);
        for _ in 0..5 {
            scene.tick(0.3);
        }

        assert!(!flag.get());
        assert!(scene.coroutine_done(id));
    }

    #[test]
    fn test_owner_destroyed_prunes_coroutine() {
        let (mut scene, host) = scene_with_host();
        let count = Rc::new(Cell::new(0));
        scene
            .start_coroutine(host, TickCounter { count: Rc::clone(&count) })
            .unwrap();
        let entity = scene.world().owner_of(host).unwrap();

        scene.tick(0.016);
        let before = count.get();

        scene.destroy(entity);
        scene.tick(0.016);
        // The destroy lands in the same frame's phase 7, after the
        // coroutine phase, so one more resume is legitimate; after that,
        // nothing.
        let after_destroy_frame = count.get();
        assert!(after_destroy_frame <= before + 1);
        for _ in 0..3 {
            scene.tick(0.016);
        }
        assert_eq!(count.get(), after_destroy_frame);
    }

    #[test]
    fn test_owner_disabled_completes_coroutine() {
        let (mut scene, host) = scene_with_host();
        let count = Rc::new(Cell::new(0));
        let id = scene
            .start_coroutine(host, TickCounter { count: Rc::clone(&count) })
            .unwrap();

        scene.set_enabled(host, false);
        scene.tick(0.016);
        scene.tick(0.016);

        assert!(scene.coroutine_done(id));
        // Re-enabling does not revive it.
        scene.set_enabled(host, true);
        let frozen = count.get();
        scene.tick(0.016);
        assert_eq!(count.get(), frozen);
    }

    /// Yields a nested sequence, then records completion.
    struct Outer {
        inner_flag: Rc<Cell<bool>>,
        outer_flag: Rc<Cell<bool>>,
        step: u8,
    }

    impl Sequence for Outer {
        fn resume(&mut self, _ctx: &mut Context) -> Step {
            match self.step {
                0 => {
                    self.step = 1;
                    Step::Yield(Wait::sequence(Immediate {
                        flag: Rc::clone(&self.inner_flag),
                    }))
                }
                _ => {
                    self.outer_flag.set(true);
                    Step::Done
                }
            }
        }
    }

    #[test]
    fn test_nested_sequence_trampolines() {
        let (mut scene, host) = scene_with_host();
        let inner_flag = Rc::new(Cell::new(false));
        let outer_flag = Rc::new(Cell::new(false));
        let id = scene
            .start_coroutine(
                host,
                Outer {
                    inner_flag: Rc::clone(&inner_flag),
                    outer_flag: Rc::clone(&outer_flag),
                    step: 0,
                },
            )
            .unwrap();

        // The nested sequence ran through its first (only) step at
        // registration; the parent is still parked on the join.
        assert!(inner_flag.get());
        assert!(!outer_flag.get());
        assert!(!scene.coroutine_done(id));

        scene.tick(0.016);
        assert!(outer_flag.get());
        assert!(scene.coroutine_done(id));
    }

    /// Waits on a predicate before setting a flag.
    struct Gated {
        flag: Rc<Cell<bool>>,
        gate: Rc<Cell<bool>>,
        step: u8,
    }

    impl Sequence for Gated {
        fn resume(&mut self, _ctx: &mut Context) -> Step {
            match self.step {
                0 => {
                    self.step = 1;
                    let gate = Rc::clone(&self.gate);
                    Step::Yield(Wait::until(move |_world| gate.get()))
                }
                _ => {
                    self.flag.set(true);
                    Step::Done
                }
            }
        }
    }

    #[test]
    fn test_predicate_wait_polls_until_it_flips() {
        let (mut scene, host) = scene_with_host();
        let flag = Rc::new(Cell::new(false));
        let gate = Rc::new(Cell::new(false));
        scene
            .start_coroutine(
                host,
                Gated {
                    flag: Rc::clone(&flag),
                    gate: Rc::clone(&gate),
                    step: 0,
                },
            )
            .unwrap();

        scene.tick(0.016);
        scene.tick(0.016);
        assert!(!flag.get());

        gate.set(true);
        scene.tick(0.016);
        assert!(flag.get());
    }

    /// Panics on its first resume after suspending once.
    struct Exploding {
        step: u8,
    }

    impl Sequence for Exploding {
        fn resume(&mut self, _ctx: &mut Context) -> Step {
            match self.step {
                0 => {
                    self.step = 1;
                    Step::Yield(Wait::Tick)
                }
                _ => panic!("sequence exploded"),
            }
        }
    }

    #[test]
    fn test_panicking_step_marks_done_and_frame_survives() {
        let (mut scene, host) = scene_with_host();
        let id = scene.start_coroutine(host, Exploding { step: 0 }).unwrap();

        scene.tick(0.016);
        assert!(scene.coroutine_done(id));
        assert_eq!(scene.time().frame(), 1);

        // Never retried.
        scene.tick(0.016);
    }

    #[test]
    fn test_finished_slots_are_reclaimed() {
        let (mut scene, host) = scene_with_host();
        let flag = Rc::new(Cell::new(false));
        scene
            .start_coroutine(host, Immediate { flag: Rc::clone(&flag) })
            .unwrap();

        assert_eq!(scene.coroutines.live_count(), 1);
        scene.tick(0.016);
        assert_eq!(scene.coroutines.live_count(), 0);
    }
}
