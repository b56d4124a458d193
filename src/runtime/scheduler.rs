// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::collections::HashMap;
use std::fmt;

use tracing::{debug, warn};

/// Groups tasks so they can be cancelled together.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct Tag(&'static str);

impl Tag {
    /// Note triggers of the song that is playing.
    pub const MUSIC: Tag = Tag("music");
    /// Decode continuations of the song that is playing.
    pub const DECODE: Tag = Tag("decode");
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Identifies a scheduled task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaskId {
    pub tick: u64,
    pub stamp: u64,
}

/// Raised when a tick holds more tasks than one host callback may run.
#[derive(Debug, thiserror::Error, PartialEq)]
#[error("tick {tick} exceeded its budget of {limit} tasks, {discarded} tasks were discarded")]
pub struct BudgetExceeded {
    pub tick: u64,
    pub limit: usize,
    pub discarded: usize,
}

struct Task<A> {
    stamp: u64,
    tag: Option<Tag>,
    action: A,
}

/// A discrete event scheduler driven one tick at a time.
///
/// Tasks are bucketed by absolute tick and fire in the order they were scheduled. Cancelling
/// a tag raises its fence to the current order counter. Tasks stamped below the fence of
/// their tag are skipped when their tick comes, so cancellation never has to search the
/// buckets.
pub struct Scheduler<A> {
    current_tick: u64,
    order: u64,
    buckets: HashMap<u64, Vec<Task<A>>>,
    fences: HashMap<Tag, u64>,
    max_tasks_per_tick: usize,
    /// Live tasks already taken out of the running tick's bucket.
    taken: usize,
}

impl<A> Scheduler<A> {
    /// Creates a scheduler that runs at most `max_tasks_per_tick` tasks per tick.
    pub fn new(max_tasks_per_tick: usize) -> Scheduler<A> {
        Scheduler {
            current_tick: 0,
            order: 0,
            buckets: HashMap::new(),
            fences: HashMap::new(),
            max_tasks_per_tick,
            taken: 0,
        }
    }

    /// Gets the tick the next call to [`Scheduler::advance_tick`] runs.
    pub fn current_tick(&self) -> u64 {
        self.current_tick
    }

    /// Gets the number of tasks one tick may run.
    pub fn max_tasks_per_tick(&self) -> usize {
        self.max_tasks_per_tick
    }

    /// Gets the number of live tasks a tick holds. For the running tick this includes the tasks
    /// it has already run or is about to run.
    pub fn load(&self, tick: u64) -> usize {
        let queued = self
            .buckets
            .get(&tick)
            .map_or(0, |tasks| self.live(tasks));
        if tick == self.current_tick {
            self.taken + queued
        } else {
            queued
        }
    }

    fn live(&self, tasks: &[Task<A>]) -> usize {
        tasks.iter().filter(|task| !self.is_cancelled(task)).count()
    }

    /// Gets the number of queued tasks, including ones that will be skipped as cancelled.
    pub fn pending(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    /// Returns true if nothing is queued.
    pub fn is_idle(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Queues an action `delay` ticks from now. A zero delay scheduled while a tick is running
    /// fires later in that same tick.
    pub fn schedule(&mut self, action: A, delay: u64, tag: Option<Tag>) -> TaskId {
        let tick = self.current_tick + delay;
        let stamp = self.next_stamp();
        self.buckets.entry(tick).or_default().push(Task { stamp, tag, action });
        TaskId { tick, stamp }
    }

    /// Cancels every task queued under the tag so far. Later tasks with the tag are unaffected.
    pub fn cancel(&mut self, tag: Tag) {
        let fence = self.next_stamp();
        self.fences.insert(tag, fence);
        debug!(tag = %tag, fence, "Cancelled tag");
    }

    fn next_stamp(&mut self) -> u64 {
        let stamp = self.order;
        self.order += 1;
        stamp
    }

    fn is_cancelled(&self, task: &Task<A>) -> bool {
        task.tag
            .and_then(|tag| self.fences.get(&tag))
            .is_some_and(|fence| task.stamp < *fence)
    }

    /// Runs every live task of the current tick in order and moves to the next tick.
    ///
    /// The handler may schedule and cancel through the scheduler it is given. If the tick runs
    /// more than the allowed number of tasks, the remaining tasks of the tick are discarded and
    /// [`BudgetExceeded`] is returned. The tick advances whether or not the handler fails.
    pub fn advance_tick<E, F>(&mut self, mut handler: F) -> Result<(), E>
    where
        E: From<BudgetExceeded>,
        F: FnMut(&mut Self, A) -> Result<(), E>,
    {
        let tick = self.current_tick;
        let result = self.run_tick(tick, &mut handler);
        self.buckets.remove(&tick);
        self.taken = 0;
        self.current_tick += 1;
        result
    }

    fn run_tick<E, F>(&mut self, tick: u64, handler: &mut F) -> Result<(), E>
    where
        E: From<BudgetExceeded>,
        F: FnMut(&mut Self, A) -> Result<(), E>,
    {
        let mut fired = 0;
        // Handlers may append to this tick's bucket, so take it again until it stays empty.
        while let Some(tasks) = self.buckets.remove(&tick) {
            self.taken += self.live(&tasks);
            let mut tasks = tasks.into_iter();
            while let Some(task) = tasks.next() {
                if self.is_cancelled(&task) {
                    continue;
                }
                if fired == self.max_tasks_per_tick {
                    let live = 1 + tasks.filter(|task| !self.is_cancelled(task)).count();
                    let queued = self.buckets.get(&tick).map_or(0, |tasks| self.live(tasks));
                    let error = BudgetExceeded {
                        tick,
                        limit: self.max_tasks_per_tick,
                        discarded: live + queued,
                    };
                    warn!(tick, discarded = error.discarded, "Tick budget exceeded");
                    return Err(error.into());
                }
                fired += 1;
                handler(self, task.action)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum TestAction {
        Log(&'static str),
        Chain(&'static str, u64),
    }

    #[derive(Debug, PartialEq)]
    enum TestError {
        Budget(BudgetExceeded),
    }

    impl From<BudgetExceeded> for TestError {
        fn from(e: BudgetExceeded) -> Self {
            TestError::Budget(e)
        }
    }

    /// Advances one tick, returning the fired labels.
    fn step(
        scheduler: &mut Scheduler<TestAction>,
    ) -> Result<Vec<&'static str>, TestError> {
        let mut fired = Vec::new();
        scheduler.advance_tick(|scheduler, action| {
            match action {
                TestAction::Log(label) => fired.push(label),
                TestAction::Chain(label, delay) => {
                    fired.push(label);
                    scheduler.schedule(TestAction::Log("chained"), delay, None);
                }
            }
            Ok::<(), TestError>(())
        })?;
        Ok(fired)
    }

    #[test]
    fn test_fires_in_schedule_order() -> Result<(), TestError> {
        let mut scheduler = Scheduler::new(64);
        scheduler.schedule(TestAction::Log("b"), 1, None);
        scheduler.schedule(TestAction::Log("a"), 0, None);
        scheduler.schedule(TestAction::Log("c"), 1, Some(Tag::MUSIC));
        assert_eq!(3, scheduler.pending());

        assert_eq!(vec!["a"], step(&mut scheduler)?);
        assert_eq!(vec!["b", "c"], step(&mut scheduler)?);
        assert!(step(&mut scheduler)?.is_empty());
        assert!(scheduler.is_idle());
        assert_eq!(3, scheduler.current_tick());
        Ok(())
    }

    #[test]
    fn test_same_tick_chaining() -> Result<(), TestError> {
        let mut scheduler = Scheduler::new(64);
        scheduler.schedule(TestAction::Chain("first", 0), 0, None);
        scheduler.schedule(TestAction::Log("second"), 0, None);
        assert_eq!(vec!["first", "second", "chained"], step(&mut scheduler)?);
        assert!(scheduler.is_idle());

        scheduler.schedule(TestAction::Chain("later", 2), 0, None);
        assert_eq!(vec!["later"], step(&mut scheduler)?);
        assert!(step(&mut scheduler)?.is_empty());
        assert_eq!(vec!["chained"], step(&mut scheduler)?);
        Ok(())
    }

    #[test]
    fn test_cancellation_fence() -> Result<(), TestError> {
        let mut scheduler = Scheduler::new(64);
        scheduler.schedule(TestAction::Log("old music"), 2, Some(Tag::MUSIC));
        scheduler.schedule(TestAction::Log("decode"), 2, Some(Tag::DECODE));
        scheduler.schedule(TestAction::Log("untagged"), 2, None);
        scheduler.cancel(Tag::MUSIC);
        scheduler.schedule(TestAction::Log("new music"), 2, Some(Tag::MUSIC));

        assert!(step(&mut scheduler)?.is_empty());
        assert!(step(&mut scheduler)?.is_empty());
        assert_eq!(
            vec!["decode", "untagged", "new music"],
            step(&mut scheduler)?
        );
        Ok(())
    }

    #[test]
    fn test_cancel_without_tasks() -> Result<(), TestError> {
        let mut scheduler: Scheduler<TestAction> = Scheduler::new(64);
        scheduler.cancel(Tag::DECODE);
        assert!(scheduler.is_idle());
        scheduler.schedule(TestAction::Log("after"), 0, Some(Tag::DECODE));
        assert_eq!(vec!["after"], step(&mut scheduler)?);
        Ok(())
    }

    #[test]
    fn test_load_counts_live_tasks() -> Result<(), TestError> {
        let mut scheduler = Scheduler::new(64);
        scheduler.schedule(TestAction::Log("a"), 2, Some(Tag::MUSIC));
        scheduler.schedule(TestAction::Log("b"), 2, None);
        assert_eq!(2, scheduler.load(2));
        scheduler.cancel(Tag::MUSIC);
        assert_eq!(1, scheduler.load(2));
        assert_eq!(0, scheduler.load(0));

        // While a tick runs, its load includes the tasks already taken from the bucket.
        scheduler.schedule(TestAction::Log("c"), 0, None);
        scheduler.schedule(TestAction::Log("d"), 0, None);
        let mut seen = Vec::new();
        scheduler.advance_tick(|scheduler, _| {
            seen.push(scheduler.load(0));
            Ok::<(), TestError>(())
        })?;
        assert_eq!(vec![2, 2], seen);
        assert_eq!(0, scheduler.load(1));
        assert_eq!(1, scheduler.load(2));
        Ok(())
    }

    #[test]
    fn test_budget_exceeded() {
        let mut scheduler = Scheduler::new(2);
        for _ in 0..3 {
            scheduler.schedule(TestAction::Log("x"), 0, None);
        }
        scheduler.schedule(TestAction::Log("cancelled"), 0, Some(Tag::MUSIC));
        scheduler.cancel(Tag::MUSIC);
        scheduler.schedule(TestAction::Chain("chain", 0), 0, None);
        scheduler.schedule(TestAction::Log("next"), 1, None);

        assert_eq!(
            Err(TestError::Budget(BudgetExceeded {
                tick: 0,
                limit: 2,
                discarded: 2
            })),
            step(&mut scheduler)
        );
        assert_eq!(1, scheduler.current_tick());
        assert_eq!(Ok(vec!["next"]), step(&mut scheduler));
    }
}
