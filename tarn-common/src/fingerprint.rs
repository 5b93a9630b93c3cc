use sha2::{Digest, Sha256};

/// Stable hash of a job's payload used for idempotent enqueue.
/// Callers pass in the payload already serialized to a canonical form
/// (typically `serde_json::to_string` of a struct with volatile fields like
/// timestamps stripped) so the same logical job always fingerprints
/// identically.
pub fn fingerprint(project_id: &str, canonical_payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(project_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(canonical_payload.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// `backoff(k) = min(5s * 3^k, 5min)`, before jitter. Monotonic in `k`
/// (`E[backoff(k1)] <= E[backoff(k2)]` for `k1 <= k2`); jitter is
/// mean-preserving and applied only in [`backoff_millis`].
pub fn expected_backoff_millis(attempt_count: u32) -> u64 {
    const BASE_MS: u64 = 5_000;
    const CAP_MS: u64 = 5 * 60 * 1_000;

    let exp = attempt_count.min(10);
    BASE_MS.saturating_mul(3u64.saturating_pow(exp)).min(CAP_MS)
}

/// `backoff(k) = min(5s * 3^k, 5min)` with +/-20% jitter.
pub fn backoff_millis(attempt_count: u32) -> u64 {
    let unjittered = expected_backoff_millis(attempt_count);
    let jitter_frac = deterministic_jitter(attempt_count);
    let jittered = (unjittered as f64) * (1.0 + jitter_frac);
    jittered.round().max(0.0) as u64
}

/// Jitter in `[-0.2, 0.2]`, derived from the attempt count rather than a
/// global RNG so backoff is reproducible in tests while still spreading
/// retries out in production (each job's attempt count differs).
fn deterministic_jitter(attempt_count: u32) -> f64 {
    use rand::{rngs::StdRng, Rng, SeedableRng};
    let mut rng = StdRng::seed_from_u64(u64::from(attempt_count) ^ 0x9E37_79B9_7F4A_7C15);
    rng.gen_range(-0.2..=0.2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_and_tenant_scoped() {
        let a = fingerprint("proj-a", "{\"doc\":\"d1\"}");
        let b = fingerprint("proj-a", "{\"doc\":\"d1\"}");
        let c = fingerprint("proj-b", "{\"doc\":\"d1\"}");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn expected_backoff_is_monotonic_and_capped() {
        let k1 = expected_backoff_millis(0);
        let k2 = expected_backoff_millis(1);
        let k_cap = expected_backoff_millis(9);
        assert!(k1 <= k2);
        assert!(k2 <= k_cap);
        assert_eq!(k_cap, 5 * 60 * 1_000);
    }

    #[test]
    fn jitter_stays_within_twenty_percent() {
        for attempt in 0..12 {
            let expected = expected_backoff_millis(attempt) as f64;
            let actual = backoff_millis(attempt) as f64;
            assert!((actual - expected).abs() <= expected * 0.2 + 1.0);
        }
    }
}
