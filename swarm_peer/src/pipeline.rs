//! The outbound request pipeline (§4.4 "Request pipeline").

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use swarm_select::BlockInfo;

const DEFAULT_MAX_OUT_REQUEST_QUEUE: usize = 8;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

struct Outstanding {
    block: BlockInfo,
    requested_at: Instant,
}

/// Tracks blocks this connection has requested from its peer but not
/// yet received, so a slow peer's requests can be timed out and handed
/// back to the picker.
pub struct RequestPipeline {
    outstanding: VecDeque<Outstanding>,
    max_depth: usize,
    request_timeout: Duration,
}

impl Default for RequestPipeline {
    fn default() -> RequestPipeline {
        RequestPipeline {
            outstanding: VecDeque::new(),
            max_depth: DEFAULT_MAX_OUT_REQUEST_QUEUE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl RequestPipeline {
    pub fn with_max_depth(mut self, max_depth: usize) -> RequestPipeline {
        self.max_depth = max_depth;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> RequestPipeline {
        self.request_timeout = timeout;
        self
    }

    pub fn len(&self) -> usize {
        self.outstanding.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outstanding.is_empty()
    }

    /// Remaining pipeline slots this connection can fill right now.
    pub fn available_slots(&self) -> usize {
        self.max_depth.saturating_sub(self.outstanding.len())
    }

    pub fn push(&mut self, block: BlockInfo, now: Instant) {
        self.outstanding.push_back(Outstanding { block, requested_at: now });
    }

    /// Match an incoming PIECE against the pipeline (§4.4: matched
    /// against the head, but mismatches are accepted if they correspond
    /// to any in-flight request). Returns `true` if the block was
    /// in-flight and has now been removed.
    pub fn complete(&mut self, block: BlockInfo) -> bool {
        if let Some(index) = self.outstanding.iter().position(|o| o.block == block) {
            self.outstanding.remove(index);
            true
        } else {
            false
        }
    }

    /// Drop every outstanding request whose age exceeds the configured
    /// timeout, returning the blocks so the caller can hand them back
    /// to the picker and count the timeout against the peer's failure
    /// budget.
    pub fn expire(&mut self, now: Instant) -> Vec<BlockInfo> {
        let timeout = self.request_timeout;
        let mut expired = Vec::new();

        while let Some(front) = self.outstanding.front() {
            if now.duration_since(front.requested_at) >= timeout {
                expired.push(self.outstanding.pop_front().unwrap().block);
            } else {
                break;
            }
        }

        expired
    }

    /// Return every outstanding block (e.g. on disconnect) and clear
    /// the pipeline.
    pub fn drain(&mut self) -> Vec<BlockInfo> {
        self.outstanding.drain(..).map(|o| o.block).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(offset: u64) -> BlockInfo {
        BlockInfo::new(0, offset, 16 * 1024)
    }

    #[test]
    fn positive_available_slots_shrinks_as_requests_queue() {
        let mut pipeline = RequestPipeline::default().with_max_depth(2);
        assert_eq!(pipeline.available_slots(), 2);

        pipeline.push(block(0), Instant::now());
        assert_eq!(pipeline.available_slots(), 1);
    }

    #[test]
    fn positive_complete_removes_matching_block() {
        let mut pipeline = RequestPipeline::default();
        pipeline.push(block(0), Instant::now());
        pipeline.push(block(16 * 1024), Instant::now());

        assert!(pipeline.complete(block(16 * 1024)));
        assert_eq!(pipeline.len(), 1);
        assert!(!pipeline.complete(block(16 * 1024)));
    }

    #[test]
    fn positive_expire_returns_only_timed_out_blocks() {
        let mut pipeline = RequestPipeline::default().with_request_timeout(Duration::from_millis(10));
        let start = Instant::now();
        pipeline.push(block(0), start);

        let expired = pipeline.expire(start + Duration::from_millis(5));
        assert!(expired.is_empty());

        let expired = pipeline.expire(start + Duration::from_millis(20));
        assert_eq!(expired, vec![block(0)]);
        assert!(pipeline.is_empty());
    }
}
