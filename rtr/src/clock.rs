// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::config::SessionTimers;
use crate::session::FsmEvent;
use crate::{COMPONENT_RTR, MOD_CLOCK};
use rpki_common::lock;
use slog::{error, Logger};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread::{sleep, spawn, JoinHandle};
use std::time::Duration;

#[derive(Clone)]
pub struct Clock {
    pub resolution: Duration,
    pub timers: Arc<ClockTimers>,
    pub join_handle: Arc<JoinHandle<()>>,

    shutdown: Arc<AtomicBool>,
}

/// Session timers. All of them are one shot: a timer that fires is disabled
/// until the session arms it again.
pub struct ClockTimers {
    /// How long to wait before the next connection attempt. The interval
    /// follows the reconnect backoff.
    pub connect_retry_timer: Mutex<Timer>,

    /// Time until the next serial query once synchronized.
    pub refresh_timer: Mutex<Timer>,

    /// Time until a query is retried after the cache had no data.
    pub retry_timer: Mutex<Timer>,

    /// Time until data from the last synchronization is discarded.
    pub expire_timer: Mutex<Timer>,

    /// Time an outstanding query may go unanswered.
    pub response_timer: Timer,
}

impl Clock {
    pub fn new(
        timers: &SessionTimers,
        s: Sender<FsmEvent>,
        log: Logger,
    ) -> Self {
        let resolution = timers.resolution();
        let shutdown = Arc::new(AtomicBool::new(false));
        let timers = Arc::new(ClockTimers {
            connect_retry_timer: Mutex::new(Timer::new(timers.connect_retry())),
            refresh_timer: Mutex::new(Timer::new(timers.refresh())),
            retry_timer: Mutex::new(Timer::new(timers.retry())),
            expire_timer: Mutex::new(Timer::new(timers.expire())),
            response_timer: Timer::new(timers.response_timeout()),
        });
        let join_handle = Arc::new(Self::run(
            resolution,
            timers.clone(),
            s,
            shutdown.clone(),
            log,
        ));
        Self {
            resolution,
            timers,
            join_handle,
            shutdown,
        }
    }

    fn run(
        resolution: Duration,
        timers: Arc<ClockTimers>,
        s: Sender<FsmEvent>,
        shutdown: Arc<AtomicBool>,
        log: Logger,
    ) -> JoinHandle<()> {
        spawn(move || loop {
            if shutdown.load(Ordering::Relaxed) {
                return;
            }
            Self::step_all(resolution, &timers, &s, &log);
            sleep(resolution);
        })
    }

    fn step_all(
        resolution: Duration,
        timers: &ClockTimers,
        s: &Sender<FsmEvent>,
        log: &Logger,
    ) {
        Self::step(
            resolution,
            &lock!(timers.connect_retry_timer),
            FsmEvent::ConnectRetryTimerExpires,
            s,
            log,
        );
        Self::step(
            resolution,
            &lock!(timers.refresh_timer),
            FsmEvent::RefreshTimerExpires,
            s,
            log,
        );
        Self::step(
            resolution,
            &lock!(timers.retry_timer),
            FsmEvent::RetryTimerExpires,
            s,
            log,
        );
        Self::step(
            resolution,
            &lock!(timers.expire_timer),
            FsmEvent::ExpireTimerExpires,
            s,
            log,
        );
        Self::step(
            resolution,
            &timers.response_timer,
            FsmEvent::ResponseTimerExpires,
            s,
            log,
        );
    }

    fn step(
        resolution: Duration,
        t: &Timer,
        event: FsmEvent,
        s: &Sender<FsmEvent>,
        log: &Logger,
    ) {
        t.tick(resolution);
        if t.expired() {
            t.disable();
            t.reset();
            if let Err(e) = s.send(event.clone()) {
                error!(log, "send timer event {:?}: {e}", event;
                    "component" => COMPONENT_RTR,
                    "module" => MOD_CLOCK
                );
            }
        }
    }

    /// Stop all timers without stopping the clock.
    pub fn disable_all(&self) {
        lock!(self.timers.connect_retry_timer).disable();
        lock!(self.timers.refresh_timer).disable();
        lock!(self.timers.retry_timer).disable();
        lock!(self.timers.expire_timer).disable();
        self.timers.response_timer.disable();
    }

    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for Clock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clock")
            .field("resolution", &self.resolution)
            .field("connect_retry", &*lock!(self.timers.connect_retry_timer))
            .field("refresh", &*lock!(self.timers.refresh_timer))
            .field("retry", &*lock!(self.timers.retry_timer))
            .field("expire", &*lock!(self.timers.expire_timer))
            .field("response", &self.timers.response_timer)
            .finish()
    }
}

#[derive(Clone)]
pub struct Timer {
    /// How long a timer runs until it fires.
    pub interval: Duration,

    /// Timer state. The first value indicates if the timer is enabled. The
    /// second value indicates how much time is left.
    value: Arc<Mutex<(bool, Duration)>>,
}

impl Timer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            value: Arc::new(Mutex::new((false, interval))),
        }
    }

    /// Decrement the time left by `resolution`, saturating at zero.
    pub fn tick(&self, resolution: Duration) {
        let mut value = lock!(self.value);
        if value.0 {
            value.1 = value.1.saturating_sub(resolution);
        }
    }

    pub fn enabled(&self) -> bool {
        lock!(self.value).0
    }

    pub fn enable(&self) {
        lock!(self.value).0 = true
    }

    pub fn disable(&self) {
        lock!(self.value).0 = false
    }

    /// True if the timer is enabled and has ticked down to zero.
    pub fn expired(&self) -> bool {
        let v = lock!(self.value);
        v.0 && v.1.is_zero()
    }

    pub fn reset(&self) {
        lock!(self.value).1 = self.interval;
    }

    /// Reset and enable.
    pub fn arm(&self) {
        let mut v = lock!(self.value);
        *v = (true, self.interval);
    }

    pub fn remaining(&self) -> Duration {
        lock!(self.value).1
    }
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (enabled, remaining) = *lock!(self.value);
        f.debug_struct("Timer")
            .field("interval", &self.interval)
            .field("enabled", &enabled)
            .field("remaining", &remaining)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rpki_common::log::test_logger;
    use std::sync::mpsc::channel;

    #[test]
    fn timer_is_one_shot() {
        let timers = SessionTimers {
            resolution_ms: 10,
            refresh_ms: 50,
            ..Default::default()
        };
        let (tx, rx) = channel();
        let clock = Clock::new(&timers, tx, test_logger());
        lock!(clock.timers.refresh_timer).arm();

        let e = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(matches!(e, FsmEvent::RefreshTimerExpires));
        assert!(!lock!(clock.timers.refresh_timer).enabled());
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
        clock.stop();
    }

    #[test]
    fn interval_change_applies_on_arm() {
        let t = Timer::new(Duration::from_secs(10));
        t.arm();
        t.tick(Duration::from_secs(3));
        assert_eq!(t.remaining(), Duration::from_secs(7));
        let mut t = t;
        t.interval = Duration::from_secs(1);
        t.arm();
        t.tick(Duration::from_secs(1));
        assert!(t.expired());
    }
}
