//! Board view model: the single-writer container renderers observe.
//!
//! Only two parties mutate it: the stream merger (confirmed boards, stream
//! failures) and the drag controller (optimistic moves, their settlement and
//! rollback). All mutation happens under one mutex and every change is
//! published to a `tokio::sync::watch` channel.
//!
//! The displayed board is a tagged state:
//!
//! - `Confirmed(board)`: exactly the latest board computed from the store
//! - `PendingOptimistic { board, rollback }`: at least one local move is on
//!   top of the confirmed board; `rollback` is what the board looked like
//!   before the most recent move
//!
//! Pending moves are kept as overlays over the confirmed board. A new
//! confirmed board drops overlays whose write already succeeded (or that the
//! store already reflects) and re-applies the ones still in flight.

use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::watch;

use crate::board::{Board, Placement};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BoardStatus {
    /// Waiting for the first snapshot of both collections.
    Loading,
    Ready,
    /// A subscription failed; the last good board (if any) is kept.
    Unavailable { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardState {
    Confirmed(Board),
    PendingOptimistic { board: Board, rollback: Board },
}

impl BoardState {
    pub fn board(&self) -> &Board {
        match self {
            BoardState::Confirmed(board) => board,
            BoardState::PendingOptimistic { board, .. } => board,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, BoardState::PendingOptimistic { .. })
    }
}

/// What renderers receive on every change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardView {
    pub status: BoardStatus,
    pub state: Option<BoardState>,
    /// Moves whose write has not settled yet.
    pub moves_in_flight: usize,
    pub revision: u64,
}

impl BoardView {
    pub fn board(&self) -> Option<&Board> {
        self.state.as_ref().map(BoardState::board)
    }

    pub fn placement(&self, task_id: &str) -> Option<Placement> {
        self.board().and_then(|board| board.placement(task_id))
    }
}

/// Handle for one optimistic move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveTicket(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    Settled,
    /// A confirmed board already absorbed the move.
    Superseded,
    Detached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// The pre-move snapshot was put back verbatim.
    Restored,
    /// The board changed since the move; only this move was withdrawn.
    Recomputed,
    /// The move was no longer pending.
    Superseded,
    Detached,
}

struct PendingMove {
    ticket: MoveTicket,
    task_id: String,
    target: Option<String>,
    settled: bool,
    rollback: Board,
    applied_at: u64,
}

impl PendingMove {
    fn apply(&self, board: &Board) -> Board {
        board
            .with_task_moved(&self.task_id, self.target.as_deref())
            .unwrap_or_else(|| board.clone())
    }

    fn reflected_in(&self, board: &Board) -> bool {
        board.placement(&self.task_id) == Some(Placement::from_stage(self.target.as_deref()))
    }
}

struct Inner {
    status: BoardStatus,
    confirmed: Option<Board>,
    state: Option<BoardState>,
    pending: Vec<PendingMove>,
    next_ticket: u64,
    revision: u64,
    detached: bool,
}

impl Inner {
    fn view(&self) -> BoardView {
        BoardView {
            status: self.status.clone(),
            state: self.state.clone(),
            moves_in_flight: self.pending.iter().filter(|m| !m.settled).count(),
            revision: self.revision,
        }
    }

    /// Confirmed board with the given overlays applied in order.
    fn overlay(&self, moves: &[PendingMove]) -> Option<Board> {
        let confirmed = self.confirmed.as_ref()?;
        Some(moves.iter().fold(confirmed.clone(), |board, m| m.apply(&board)))
    }

    fn rebuild(&mut self) {
        let Some(confirmed) = self.confirmed.as_ref() else {
            self.state = None;
            return;
        };
        self.state = match self.pending.split_last() {
            None => Some(BoardState::Confirmed(confirmed.clone())),
            Some((last, earlier)) => self.overlay(earlier).map(|rollback| {
                BoardState::PendingOptimistic {
                    board: last.apply(&rollback),
                    rollback,
                }
            }),
        };
    }
}

pub struct BoardViewModel {
    inner: Mutex<Inner>,
    tx: watch::Sender<BoardView>,
}

impl Default for BoardViewModel {
    fn default() -> Self {
        Self::new()
    }
}

impl BoardViewModel {
    pub fn new() -> Self {
        let inner = Inner {
            status: BoardStatus::Loading,
            confirmed: None,
            state: None,
            pending: Vec::new(),
            next_ticket: 1,
            revision: 0,
            detached: false,
        };
        let (tx, _rx) = watch::channel(inner.view());
        Self {
            inner: Mutex::new(inner),
            tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, inner: &mut Inner) {
        inner.revision += 1;
        self.tx.send_replace(inner.view());
    }

    /// Subscribe to every future change; the current view is marked seen.
    pub fn watch(&self) -> watch::Receiver<BoardView> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> BoardView {
        self.lock().view()
    }

    /// The board as currently displayed, optimistic moves included.
    pub fn board(&self) -> Option<Board> {
        self.lock().state.as_ref().map(|state| state.board().clone())
    }

    pub fn status(&self) -> BoardStatus {
        self.lock().status.clone()
    }

    pub fn is_detached(&self) -> bool {
        self.lock().detached
    }

    /// Replace the confirmed board. Returns `false` once detached.
    pub(crate) fn apply_confirmed(&self, board: Board) -> bool {
        let mut inner = self.lock();
        if inner.detached {
            return false;
        }
        inner
            .pending
            .retain(|m| !m.settled && !m.reflected_in(&board));
        inner.confirmed = Some(board);
        inner.status = BoardStatus::Ready;
        inner.rebuild();
        self.publish(&mut inner);
        true
    }

    /// Flag the board as unavailable, keeping whatever is displayed.
    pub(crate) fn mark_unavailable(&self, reason: impl Into<String>) -> bool {
        let mut inner = self.lock();
        if inner.detached {
            return false;
        }
        inner.status = BoardStatus::Unavailable {
            reason: reason.into(),
        };
        self.publish(&mut inner);
        true
    }

    /// Stop accepting changes. Nothing is published after this.
    pub(crate) fn detach(&self) {
        let mut inner = self.lock();
        inner.detached = true;
        inner.pending.clear();
    }

    /// Validate and apply a move locally, before it is persisted.
    pub(crate) fn begin_move(&self, task_id: &str, target: Option<&str>) -> Result<MoveTicket> {
        let mut inner = self.lock();
        if inner.detached {
            return Err(Error::BoardUnavailable("board subscription closed".to_string()));
        }
        let current = match inner.state.as_ref() {
            Some(state) => state.board().clone(),
            None => {
                let reason = match &inner.status {
                    BoardStatus::Unavailable { reason } => reason.clone(),
                    _ => "board not loaded yet".to_string(),
                };
                return Err(Error::BoardUnavailable(reason));
            }
        };
        if current.find_task(task_id).is_none() {
            return Err(Error::TaskNotFound(task_id.to_string()));
        }
        if let Some(stage_id) = target {
            if !current.has_stage(stage_id) {
                return Err(Error::UnknownStage(stage_id.to_string()));
            }
        }
        let moved = current
            .with_task_moved(task_id, target)
            .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))?;

        let ticket = MoveTicket(inner.next_ticket);
        inner.next_ticket += 1;
        inner.state = Some(BoardState::PendingOptimistic {
            board: moved,
            rollback: current.clone(),
        });
        // Recorded before publishing so watchers count this move as in flight.
        let applied_at = inner.revision + 1;
        inner.pending.push(PendingMove {
            ticket,
            task_id: task_id.to_string(),
            target: target.map(str::to_string),
            settled: false,
            rollback: current,
            applied_at,
        });
        self.publish(&mut inner);
        Ok(ticket)
    }

    /// The write for `ticket` succeeded; keep the move until the store shows it.
    pub(crate) fn settle_move(&self, ticket: MoveTicket) -> SettleOutcome {
        let mut inner = self.lock();
        if inner.detached {
            return SettleOutcome::Detached;
        }
        match inner.pending.iter_mut().find(|m| m.ticket == ticket) {
            Some(m) => {
                m.settled = true;
                self.publish(&mut inner);
                SettleOutcome::Settled
            }
            None => SettleOutcome::Superseded,
        }
    }

    /// The write for `ticket` failed; withdraw the move.
    pub(crate) fn rollback_move(&self, ticket: MoveTicket) -> RollbackOutcome {
        let mut inner = self.lock();
        if inner.detached {
            return RollbackOutcome::Detached;
        }
        let Some(index) = inner.pending.iter().position(|m| m.ticket == ticket) else {
            return RollbackOutcome::Superseded;
        };
        let withdrawn = inner.pending.remove(index);

        let outcome = if withdrawn.applied_at == inner.revision {
            inner.state = Some(match inner.pending.split_last() {
                None => BoardState::Confirmed(withdrawn.rollback),
                Some((_, earlier)) => {
                    let rollback = inner
                        .overlay(earlier)
                        .unwrap_or_else(|| withdrawn.rollback.clone());
                    BoardState::PendingOptimistic {
                        board: withdrawn.rollback,
                        rollback,
                    }
                }
            });
            RollbackOutcome::Restored
        } else {
            inner.rebuild();
            RollbackOutcome::Recomputed
        };
        self.publish(&mut inner);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Stage, Task};

    fn board(tasks: &[Task]) -> Board {
        Board::compute(
            tasks,
            &[Stage::new("backlog", "Backlog"), Stage::new("done", "Done")],
        )
    }

    fn loaded() -> BoardViewModel {
        let vm = BoardViewModel::new();
        assert!(vm.apply_confirmed(board(&[
            Task::new("t1", "one").in_stage("backlog"),
            Task::new("t2", "two"),
        ])));
        vm
    }

    fn stage_of(vm: &BoardViewModel, task_id: &str) -> Option<Placement> {
        vm.snapshot().placement(task_id)
    }

    #[test]
    fn starts_loading_without_board() {
        let vm = BoardViewModel::new();
        assert_eq!(vm.status(), BoardStatus::Loading);
        assert!(vm.board().is_none());
        assert!(matches!(
            vm.begin_move("t1", Some("done")),
            Err(Error::BoardUnavailable(_))
        ));
    }

    #[test]
    fn begin_move_is_visible_immediately() {
        let vm = loaded();
        vm.begin_move("t1", Some("done")).unwrap();
        let view = vm.snapshot();
        assert!(view.state.as_ref().unwrap().is_pending());
        assert_eq!(view.moves_in_flight, 1);
        assert_eq!(stage_of(&vm, "t1"), Some(Placement::Stage("done".into())));
    }

    #[test]
    fn rollback_restores_exact_prior_board() {
        let vm = loaded();
        let before = vm.board().unwrap();
        let ticket = vm.begin_move("t1", Some("done")).unwrap();
        assert_eq!(vm.rollback_move(ticket), RollbackOutcome::Restored);
        assert_eq!(vm.board().unwrap(), before);
        assert!(matches!(vm.snapshot().state, Some(BoardState::Confirmed(_))));
    }

    #[test]
    fn rollback_after_new_snapshot_only_withdraws_failed_move() {
        let vm = loaded();
        let ticket = vm.begin_move("t1", Some("done")).unwrap();
        vm.apply_confirmed(board(&[
            Task::new("t1", "one").in_stage("backlog"),
            Task::new("t2", "two").in_stage("done"),
        ]));
        // In-flight move survives the new snapshot.
        assert_eq!(stage_of(&vm, "t1"), Some(Placement::Stage("done".into())));

        assert_eq!(vm.rollback_move(ticket), RollbackOutcome::Recomputed);
        assert_eq!(stage_of(&vm, "t1"), Some(Placement::Stage("backlog".into())));
        assert_eq!(stage_of(&vm, "t2"), Some(Placement::Stage("done".into())));
    }

    #[test]
    fn settled_move_is_dropped_by_next_snapshot() {
        let vm = loaded();
        let ticket = vm.begin_move("t1", Some("done")).unwrap();
        assert_eq!(vm.settle_move(ticket), SettleOutcome::Settled);
        assert_eq!(vm.snapshot().moves_in_flight, 0);

        // Another writer won the race: the store says "backlog" again.
        vm.apply_confirmed(board(&[
            Task::new("t1", "one").in_stage("backlog"),
            Task::new("t2", "two"),
        ]));
        assert_eq!(stage_of(&vm, "t1"), Some(Placement::Stage("backlog".into())));
        assert!(matches!(vm.snapshot().state, Some(BoardState::Confirmed(_))));
    }

    #[test]
    fn snapshot_reflecting_move_supersedes_it() {
        let vm = loaded();
        let ticket = vm.begin_move("t2", Some("backlog")).unwrap();
        vm.apply_confirmed(board(&[
            Task::new("t1", "one").in_stage("backlog"),
            Task::new("t2", "two").in_stage("backlog"),
        ]));
        assert!(matches!(vm.snapshot().state, Some(BoardState::Confirmed(_))));
        assert_eq!(vm.rollback_move(ticket), RollbackOutcome::Superseded);
        assert_eq!(stage_of(&vm, "t2"), Some(Placement::Stage("backlog".into())));
    }

    #[test]
    fn failing_one_of_two_moves_keeps_the_other() {
        let vm = loaded();
        let before = vm.board().unwrap();
        let first = vm.begin_move("t1", Some("done")).unwrap();
        let second = vm.begin_move("t2", Some("backlog")).unwrap();
        assert_eq!(vm.rollback_move(first), RollbackOutcome::Recomputed);
        assert_eq!(stage_of(&vm, "t1"), Some(Placement::Stage("backlog".into())));
        assert_eq!(stage_of(&vm, "t2"), Some(Placement::Stage("backlog".into())));

        // The first rollback was published, so the second cannot restore verbatim.
        assert_eq!(vm.rollback_move(second), RollbackOutcome::Recomputed);
        assert_eq!(stage_of(&vm, "t2"), Some(Placement::Unassigned));
        assert_eq!(vm.board().unwrap(), before);
        assert!(matches!(vm.snapshot().state, Some(BoardState::Confirmed(_))));
    }

    #[test]
    fn unavailable_keeps_last_board() {
        let vm = loaded();
        let before = vm.board();
        assert!(vm.mark_unavailable("task stream: boom"));
        assert_eq!(
            vm.status(),
            BoardStatus::Unavailable {
                reason: "task stream: boom".to_string()
            }
        );
        assert_eq!(vm.board(), before);
    }

    #[test]
    fn validation_rejects_unknown_task_and_stage() {
        let vm = loaded();
        assert!(matches!(
            vm.begin_move("t9", None),
            Err(Error::TaskNotFound(_))
        ));
        assert!(matches!(
            vm.begin_move("t1", Some("archived")),
            Err(Error::UnknownStage(_))
        ));
        assert_eq!(vm.snapshot().moves_in_flight, 0);
    }

    #[test]
    fn detached_view_ignores_every_writer() {
        let vm = loaded();
        let ticket = vm.begin_move("t1", Some("done")).unwrap();
        let revision = vm.snapshot().revision;
        vm.detach();
        assert_eq!(vm.rollback_move(ticket), RollbackOutcome::Detached);
        assert_eq!(vm.settle_move(ticket), SettleOutcome::Detached);
        assert!(!vm.apply_confirmed(Board::default()));
        assert!(!vm.mark_unavailable("late"));
        assert_eq!(vm.snapshot().revision, revision);
    }

    #[test]
    fn watchers_see_each_change() {
        let vm = loaded();
        let mut rx = vm.watch();
        assert!(!rx.has_changed().unwrap());
        vm.begin_move("t1", Some("done")).unwrap();
        assert!(rx.has_changed().unwrap());
        let view = rx.borrow_and_update().clone();
        assert_eq!(view.placement("t1"), Some(Placement::Stage("done".into())));
    }

    #[test]
    fn published_view_counts_the_move_in_flight() {
        let vm = loaded();
        let mut rx = vm.watch();
        let ticket = vm.begin_move("t1", Some("done")).unwrap();

        let published = rx.borrow_and_update().clone();
        assert!(published.state.as_ref().unwrap().is_pending());
        assert_eq!(published.moves_in_flight, 1);
        assert_eq!(published, vm.snapshot());

        // Nothing else was published, so the rollback is verbatim.
        assert_eq!(vm.rollback_move(ticket), RollbackOutcome::Restored);
        assert_eq!(rx.borrow_and_update().moves_in_flight, 0);
    }
}
