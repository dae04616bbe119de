//! Synthetic API traffic
//!
//! Generates the reference dataset used for demos and detection tests:
//! browsing from a pool of internal addresses, a login brute-force burst and
//! a short SQL injection probe.

use crate::models::LogRecord;
use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

pub const BRUTE_FORCE_IP: &str = "10.0.0.45";
pub const INJECTION_IP: &str = "45.33.22.11";
pub const INJECTION_PAYLOAD: &str = "id=1' OR '1'='1";

pub const NORMAL_COUNT: usize = 800;
pub const BRUTE_FORCE_COUNT: usize = 150;
pub const INJECTION_COUNT: usize = 20;

const ENDPOINTS: [&str; 4] = ["/api/auth/login", "/api/data", "/api/users", "/api/products"];
const LOGIN_ENDPOINT: &str = "/api/auth/login";

/// Seeded traffic generator
pub struct TrafficGenerator {
    rng: ChaCha8Rng,
    now: DateTime<Utc>,
}

impl TrafficGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            now: Utc::now(),
        }
    }

    /// Anchor generated timestamps at `now` instead of the current time
    pub fn anchored_at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Ordinary browsing from 192.168.1.1-50 over the last ~16 hours
    pub fn normal_traffic(&mut self, count: usize) -> Vec<LogRecord> {
        (0..count)
            .map(|_| {
                let endpoint = *ENDPOINTS.choose(&mut self.rng).unwrap_or(&ENDPOINTS[1]);
                let method = if endpoint == LOGIN_ENDPOINT { "POST" } else { "GET" };
                LogRecord {
                    ip_address: format!("192.168.1.{}", self.rng.gen_range(1..=50)),
                    timestamp: self.now - Duration::minutes(self.rng.gen_range(0..=1000)),
                    endpoint: endpoint.to_string(),
                    method: method.to_string(),
                    status_code: if self.rng.gen_bool(0.95) { 200 } else { 404 },
                    response_time: self.rng.gen_range(20..=150) as f64,
                    suspected_payload: None,
                }
            })
            .collect()
    }

    /// Failed logins from one address, one per second starting five minutes ago
    pub fn brute_force(&mut self, count: usize) -> Vec<LogRecord> {
        let start = self.now - Duration::minutes(5);
        (0..count)
            .map(|i| LogRecord {
                ip_address: BRUTE_FORCE_IP.to_string(),
                timestamp: start + Duration::seconds(i as i64),
                endpoint: LOGIN_ENDPOINT.to_string(),
                method: "POST".to_string(),
                status_code: 401,
                response_time: self.rng.gen_range(30..=80) as f64,
                suspected_payload: None,
            })
            .collect()
    }

    /// Slow, failing requests carrying an injection payload, every 30 seconds
    pub fn sql_injection(&mut self, count: usize) -> Vec<LogRecord> {
        let start = self.now - Duration::minutes(10);
        (0..count)
            .map(|i| LogRecord {
                ip_address: INJECTION_IP.to_string(),
                timestamp: start + Duration::seconds(i as i64 * 30),
                endpoint: "/api/data".to_string(),
                method: "GET".to_string(),
                status_code: 500,
                response_time: self.rng.gen_range(200..=600) as f64,
                suspected_payload: Some(INJECTION_PAYLOAD.to_string()),
            })
            .collect()
    }

    /// 800 normal, 150 brute-force and 20 injection records, newest first
    pub fn reference_dataset(&mut self) -> Vec<LogRecord> {
        let mut records = self.normal_traffic(NORMAL_COUNT);
        records.extend(self.brute_force(BRUTE_FORCE_COUNT));
        records.extend(self.sql_injection(INJECTION_COUNT));
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_reference_dataset_shape() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let records = TrafficGenerator::new(3).anchored_at(now).reference_dataset();

        assert_eq!(records.len(), 970);
        assert!(records.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));

        let brute: Vec<_> = records
            .iter()
            .filter(|r| r.ip_address == BRUTE_FORCE_IP)
            .collect();
        assert_eq!(brute.len(), BRUTE_FORCE_COUNT);
        assert!(brute.iter().all(|r| r.status_code == 401 && r.method == "POST"));

        let injection: Vec<_> = records
            .iter()
            .filter(|r| r.ip_address == INJECTION_IP)
            .collect();
        assert_eq!(injection.len(), INJECTION_COUNT);
        assert!(injection.iter().all(|r| r.has_suspected_payload()));
    }

    #[test]
    fn test_normal_traffic_ranges() {
        let mut generator = TrafficGenerator::new(9);
        for r in generator.normal_traffic(300) {
            assert!(r.ip_address.starts_with("192.168.1."));
            assert!((20.0..=150.0).contains(&r.response_time));
            assert!(r.status_code == 200 || r.status_code == 404);
            assert_eq!(r.method == "POST", r.endpoint == LOGIN_ENDPOINT);
            assert!(r.validate().is_ok());
        }
    }

    #[test]
    fn test_same_seed_same_traffic() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let a = TrafficGenerator::new(11).anchored_at(now).reference_dataset();
        let b = TrafficGenerator::new(11).anchored_at(now).reference_dataset();
        assert_eq!(a, b);
    }
}
