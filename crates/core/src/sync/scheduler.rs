/// Fixed-cadence upload scheduler.
///
/// Mirrors the timer discipline of the viewer: the first request after a
/// quiet period uploads immediately and arms a fixed interval; further
/// requests ride the interval; an interval tick with nothing requested
/// disarms the timer so an idle page generates no network chatter. Time is
/// passed in as epoch milliseconds, so tests drive the clock directly.
///
/// Uploads are single-flight: while one is outstanding, `poll` stays quiet
/// until [`UploadScheduler::upload_finished`] or
/// [`UploadScheduler::upload_failed`] is called.
#[derive(Debug, Clone)]
pub struct UploadScheduler {
    interval_ms: u64,
    needed: bool,
    next_due: Option<u64>,
    in_flight: bool,
}

pub const DEFAULT_UPLOAD_INTERVAL_MS: u64 = 60_000;

impl UploadScheduler {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            needed: false,
            next_due: None,
            in_flight: false,
        }
    }

    /// Note that local state changed and should reach the server.
    pub fn request(&mut self) {
        self.needed = true;
    }

    pub fn is_armed(&self) -> bool {
        self.next_due.is_some()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Drop any armed timer; pending requests survive and re-arm on the next
    /// poll. An in-flight upload is not interrupted (its response will still
    /// be applied).
    pub fn cancel(&mut self) {
        self.next_due = None;
    }

    /// Decide whether an upload should be issued now. Returning `true` marks
    /// the upload as in flight and re-arms the interval.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        if self.in_flight {
            return false;
        }
        match self.next_due {
            None => {
                if !self.needed {
                    return false;
                }
                self.issue(now_ms)
            }
            Some(due) => {
                if now_ms < due {
                    return false;
                }
                if !self.needed {
                    self.next_due = None;
                    return false;
                }
                self.issue(now_ms)
            }
        }
    }

    fn issue(&mut self, now_ms: u64) -> bool {
        self.needed = false;
        self.next_due = Some(now_ms + self.interval_ms);
        self.in_flight = true;
        true
    }

    pub fn upload_finished(&mut self) {
        self.in_flight = false;
    }

    /// A failed upload leaves the request pending so the armed interval acts
    /// as the retry schedule; there is no backoff beyond it.
    pub fn upload_failed(&mut self) {
        self.in_flight = false;
        self.needed = true;
    }
}

impl Default for UploadScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_UPLOAD_INTERVAL_MS)
    }
}
