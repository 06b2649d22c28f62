//! 🧵 The LoaderThrottle — adaptive concurrency, nightclub edition.
//!
//! ---
//!
//! 🎬 COLD OPEN — EXT. VELVET ROPE — 11:58 PM
//!
//! A line of loader tasks stretches around the block. The bouncer counts
//! heads. Capacity is capacity. Then word comes down from inside: the
//! database is getting crushed, somebody spilled a 429 on the dance floor.
//! The bouncer doesn't argue. The bouncer lowers the capacity by one,
//! crosses their arms, and the line... waits.
//!
//! The cap only ever goes down. There is no "the club feels better now."
//! There is no redemption arc. This is not that kind of movie. 🦆
//!
//! ---
//!
//! The mechanics, minus the cinematography:
//! - `cap` starts at the configured loader count (minimum 3, we're not
//!   running a club for two) and `floor` is computed once: half the cap for
//!   big pools (cap > 7), a flat 3 for small ones.
//! - `acquire()` is the rope: a 100ms polling wait that prunes finished
//!   tasks each cycle and lets the dispatcher through when outstanding < cap.
//! - `report_overload()` is the word from inside: cap goes down by one,
//!   never below floor, no matter how many workers shout at once.
//! - `drain()` is closing time. Everybody finishes their write. Lights up.

use anyhow::{Context, Result};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// ⏱️ How often the rope gets re-checked. The original-recipe polling nap.
/// 100ms is long enough to not burn a core, short enough that nobody notices.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// 🔒 The absolute minimum anything: initial cap and small-pool floor alike.
/// Below three concurrent loaders you're not bulk loading, you're journaling.
const MIN_LOADERS: usize = 3;

/// 🧵 Everything the throttle guards, under one lock, moving as one.
///
/// The cap and the outstanding set MUST live behind the same mutex: a cap
/// check against a stale task list is how you end up with cap+2 writers and
/// a database filing a restraining order.
#[derive(Debug)]
struct ThrottleState {
    /// 📉 current concurrency cap. monotonically non-increasing. like morale.
    cap: usize,
    /// 🧾 the guest list — one JoinHandle per in-flight loader task.
    /// Pruned lazily on every acquire/report cycle; finished tasks get
    /// quietly removed like empty glasses.
    outstanding: Vec<JoinHandle<()>>,
}

/// 🚦 The adaptive concurrency limiter for loader tasks.
///
/// Shared by the dispatcher (acquire/register/drain) and every worker
/// (report_overload/current_cap) via `Arc`. All methods take `&self`;
/// the mutex inside does the actual adult supervision.
///
/// # Contract 📜
/// - `cap` never drops below `floor`, regardless of how many overload
///   reports arrive or how simultaneously they arrive.
/// - `cap` never rises. Recovery is a human decision made with a redeploy,
///   not a heuristic made at 3am by an optimistic counter.
/// - There is exactly one dispatcher, so `acquire` needs no fairness story.
///   It's a liveness wait, not a queue.
#[derive(Debug)]
pub(crate) struct LoaderThrottle {
    state: tokio::sync::Mutex<ThrottleState>,
    /// 🧱 the floor — computed once at construction, holding forever after.
    floor: usize,
}

impl LoaderThrottle {
    /// 🏗️ Builds the throttle from the configured max loader count.
    ///
    /// The configured value gets clamped up to at least 3, because a cap of
    /// 0 is a deadlock with extra steps and a cap of 1 is just a for-loop
    /// with anxiety. The floor lands at cap/2 for pools big enough to halve
    /// meaningfully (cap > 7), and at the flat minimum of 3 otherwise.
    pub(crate) fn new(max_loaders: usize) -> Self {
        let cap = max_loaders.max(MIN_LOADERS);
        let floor = if cap > 7 { cap / 2 } else { MIN_LOADERS };
        debug!("🚦 throttle up: cap {cap}, floor {floor}");
        Self {
            state: tokio::sync::Mutex::new(ThrottleState {
                cap,
                outstanding: Vec::new(),
            }),
            floor,
        }
    }

    /// 🚪 Waits until there's room under the cap for one more loader task.
    ///
    /// Each cycle: take the lock, sweep finished tasks off the guest list,
    /// check the count, and either walk through or nap for 100ms and try
    /// again. The nap happens OUTSIDE the lock — workers still need to file
    /// their overload reports while the dispatcher loiters by the rope.
    ///
    /// ⚠️ This is the rope, not a ticket: acquire leaves no mark. The task
    /// only counts once [`register`](Self::register) files its JoinHandle,
    /// which the single dispatcher does immediately after spawning. That
    /// acquire→spawn→register gap is safe precisely because there's one
    /// dispatcher. Add a second one and this comment becomes a post-mortem.
    pub(crate) async fn acquire(&self) {
        loop {
            {
                let mut state = self.state.lock().await;
                state.outstanding.retain(|handle| !handle.is_finished());
                if state.outstanding.len() < state.cap {
                    trace!(
                        "🚪 room at the rope: {} of {} slots taken",
                        state.outstanding.len(),
                        state.cap
                    );
                    return;
                }
            }
            // 💤 cap reached — nap without the lock, then re-count the room
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// 🧾 Files a freshly spawned loader task onto the guest list.
    pub(crate) async fn register(&self, handle: JoinHandle<()>) {
        self.state.lock().await.outstanding.push(handle);
    }

    /// 📉 A worker got a "too busy, come back later" from the store.
    ///
    /// Cap drops by one — unless it's already standing on the floor, in
    /// which case it stays exactly where it is. The decrement happens under
    /// the same lock as everything else, so forty workers reporting in the
    /// same instant still land the cap ON the floor, not through it.
    ///
    /// We also sweep the guest list while we're holding the lock, so the
    /// newly lowered cap bites on the dispatcher's very next acquire cycle.
    /// The worker itself doesn't wait here — its penance is the retry sleep
    /// it's about to serve. Blocking reporters inside the throttle is how a
    /// busy night turns into cap-minus-floor workers all waiting for each
    /// other. The dispatcher is the one who pauses; that's the whole design.
    pub(crate) async fn report_overload(&self) {
        let mut state = self.state.lock().await;
        if state.cap > self.floor {
            state.cap -= 1;
            debug!("📉 overload reported — cap lowered to {} (floor {})", state.cap, self.floor);
        } else {
            trace!("🧱 overload reported at the floor — cap holds at {}", state.cap);
        }
        state.outstanding.retain(|handle| !handle.is_finished());
    }

    /// 📊 The current cap, for progress lines and the morbidly curious.
    pub(crate) async fn current_cap(&self) -> usize {
        self.state.lock().await.cap
    }

    /// 🧱 The floor. Fixed at construction. Tests like to check the math.
    #[cfg(test)]
    pub(crate) fn floor(&self) -> usize {
        self.floor
    }

    /// 🏁 Closing time: waits for every outstanding loader task to finish.
    ///
    /// Takes the whole guest list in one move (new registrations are over by
    /// the time anyone calls this — the dispatcher IS the caller) and awaits
    /// each handle. A JoinError here means a worker panicked, which is a bug
    /// wearing a trenchcoat, and we surface it instead of shrugging.
    pub(crate) async fn drain(&self) -> Result<()> {
        let outstanding = {
            let mut state = self.state.lock().await;
            std::mem::take(&mut state.outstanding)
        };
        debug!("🏁 draining {} outstanding loader task(s)", outstanding.len());
        for result in futures::future::join_all(outstanding).await {
            result.context(
                "💀 A loader task panicked instead of finishing. That's not an error \
                path, that's a bug — and drain refuses to launder it into success.",
            )?;
        }
        Ok(())
    }
}
