use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// 固定容量的滑动窗口计数器，用于登录等接口的限流。
///
/// 容量写满时先剔除过期条目，仍然满则剔除最旧条目，
/// 保证内存占用有上界。
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<HashMap<String, (u32, Instant)>>>,
    capacity: usize,
    window: Duration,
    limit: u32,
}

impl RateLimiter {
    pub fn new(capacity: usize, window: Duration, limit: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            capacity,
            window,
            limit,
        }
    }

    /// 记录一次命中并返回是否仍在限额内。
    pub fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut map = self.inner.lock().unwrap();

        if let Some((count, window_start)) = map.get_mut(key) {
            if now.duration_since(*window_start) > self.window {
                // 窗口过期，重新计数
                *count = 1;
                *window_start = now;
                return true;
            }
            *count += 1;
            return *count <= self.limit;
        }

        if map.len() >= self.capacity {
            Self::evict(&mut map, self.capacity, self.window, now);
        }
        map.insert(key.to_string(), (1, now));
        true
    }

    /// 当前窗口内的命中次数
    pub fn count(&self, key: &str) -> u32 {
        let now = Instant::now();
        let map = self.inner.lock().unwrap();
        match map.get(key) {
            Some((count, window_start)) if now.duration_since(*window_start) <= self.window => {
                *count
            }
            _ => 0,
        }
    }

    pub fn reset(&self, key: &str) {
        self.inner.lock().unwrap().remove(key);
    }

    fn evict(map: &mut HashMap<String, (u32, Instant)>, capacity: usize, window: Duration, now: Instant) {
        map.retain(|_, (_, start)| now.duration_since(*start) <= window);
        if map.len() >= capacity {
            // 仍然满：剔除最旧的一条
            if let Some(oldest) = map
                .iter()
                .min_by_key(|(_, (_, start))| *start)
                .map(|(k, _)| k.clone())
            {
                map.remove(&oldest);
            }
        }
    }
}

/// 固定容量的 TTL 去重缓存，用于支付回调通知号去重。
#[derive(Clone)]
pub struct DedupCache {
    inner: Arc<Mutex<HashMap<String, Instant>>>,
    capacity: usize,
    ttl: Duration,
}

impl DedupCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            capacity,
            ttl,
        }
    }

    /// 首次见到的 key 返回 true，TTL 内重复出现返回 false。
    pub fn insert_new(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut map = self.inner.lock().unwrap();

        if let Some(seen_at) = map.get(key) {
            if now.duration_since(*seen_at) <= self.ttl {
                return false;
            }
        }

        if map.len() >= self.capacity {
            map.retain(|_, seen_at| now.duration_since(*seen_at) <= self.ttl);
            if map.len() >= self.capacity {
                if let Some(oldest) = map
                    .iter()
                    .min_by_key(|(_, seen_at)| **seen_at)
                    .map(|(k, _)| k.clone())
                {
                    map.remove(&oldest);
                }
            }
        }

        map.insert(key.to_string(), now);
        true
    }

    /// TTL 内是否已见过该 key。只读，不占用名额
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        let map = self.inner.lock().unwrap();
        matches!(map.get(key), Some(seen_at) if now.duration_since(*seen_at) <= self.ttl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter_allows_within_limit() {
        let limiter = RateLimiter::new(16, Duration::from_secs(60), 3);
        assert!(limiter.check("ip-1"));
        assert!(limiter.check("ip-1"));
        assert!(limiter.check("ip-1"));
        assert!(!limiter.check("ip-1")); // 第4次超限
        assert!(limiter.check("ip-2")); // 其他key不受影响
    }

    #[test]
    fn test_rate_limiter_window_reset() {
        let limiter = RateLimiter::new(16, Duration::from_millis(10), 1);
        assert!(limiter.check("ip-1"));
        assert!(!limiter.check("ip-1"));
        std::thread::sleep(Duration::from_millis(20));
        assert!(limiter.check("ip-1"));
    }

    #[test]
    fn test_rate_limiter_count_and_reset() {
        let limiter = RateLimiter::new(16, Duration::from_secs(60), 10);
        limiter.check("ip-1");
        limiter.check("ip-1");
        assert_eq!(limiter.count("ip-1"), 2);
        limiter.reset("ip-1");
        assert_eq!(limiter.count("ip-1"), 0);
    }

    #[test]
    fn test_dedup_cache() {
        let cache = DedupCache::new(16, Duration::from_secs(60));
        assert!(cache.insert_new("notify-1"));
        assert!(!cache.insert_new("notify-1"));
        assert!(cache.insert_new("notify-2"));
    }

    #[test]
    fn test_dedup_cache_contains_is_read_only() {
        let cache = DedupCache::new(16, Duration::from_secs(60));
        // 查询不等于记账：没插入之前可以反复查
        assert!(!cache.contains("notify-1"));
        assert!(!cache.contains("notify-1"));
        assert!(cache.insert_new("notify-1"));
        assert!(cache.contains("notify-1"));
    }

    #[test]
    fn test_dedup_cache_ttl_expiry() {
        let cache = DedupCache::new(16, Duration::from_millis(10));
        assert!(cache.insert_new("notify-1"));
        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.insert_new("notify-1"));
    }

    #[test]
    fn test_dedup_cache_bounded() {
        let cache = DedupCache::new(4, Duration::from_secs(60));
        for i in 0..10 {
            assert!(cache.insert_new(&format!("notify-{i}")));
        }
        // 容量有上界，老条目被顶出后可以重新插入
        assert!(cache.insert_new("notify-0"));
    }
}
