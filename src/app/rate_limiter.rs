use crate::utils::time_utils;

/**
 * Extremely basic rate limiter for the public attendance
 * form. One global counter for the whole service, no per-IP
 * bookkeeping: it only has to stop runaway scripts from
 * flooding the registration table and the SMS gateway.
 *
 * Counts requests in windows of max_requests_time seconds.
 * Going over max_requests inside a window blocks everything
 * for block_duration seconds.
 */
pub struct BasicRateLimiter {
  max_requests: u32,
  max_requests_time: u32,
  block_duration: u32,
  counter: u32,
  window_start: i64,
  is_limited: bool
}

impl BasicRateLimiter {
  pub fn new(max_requests: u32, max_requests_time: u32, block_duration: u32) -> Self {
    BasicRateLimiter {
      max_requests,
      max_requests_time,
      block_duration,
      counter: 0,
      window_start: time_utils::current_timestamp(),
      is_limited: false
    }
  }

  fn window_expired(&self, now: i64) -> bool {
    now - self.window_start >= i64::from(self.max_requests_time)
  }

  fn block_expired(&self, now: i64) -> bool {
    now - self.window_start >= i64::from(self.block_duration)
  }

  /**
   * Cheap read-only probe so callers holding a read lock can
   * tell whether they have to pay for the write lock at all.
   * A blocked limiter only needs touching once the block is
   * over, anything else has to count the request.
   */
  pub fn needs_update(&self) -> bool {
    if self.is_limited {
      self.block_expired(time_utils::current_timestamp())
    } else {
      true
    }
  }

  pub fn is_limited(&self) -> bool {
    self.is_limited
  }

  // Counts the current request and says whether it should be
  // rejected.
  pub fn update(&mut self) -> bool {
    let now = time_utils::current_timestamp();
    if self.is_limited {
      if self.block_expired(now) {
        self.counter = 1;
        self.window_start = now;
        self.is_limited = false;
      }
    } else if self.window_expired(now) {
      self.counter = 1;
      self.window_start = now;
    } else {
      self.counter += 1;
      if self.counter > self.max_requests {
        self.is_limited = true;
        // The block runs from the moment we tripped:
        self.window_start = now;
      }
    }
    self.is_limited
  }
}
