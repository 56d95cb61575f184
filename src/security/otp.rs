use rand::{thread_rng, Rng};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Pending one-time passwords keyed by email. A code is single use.
pub struct OtpStore {
    ttl: Duration,
    codes: Mutex<HashMap<String, (String, Instant)>>,
}

impl OtpStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            codes: Mutex::new(HashMap::new()),
        }
    }

    /// Issue a fresh six digit code, replacing any pending one
    pub fn issue(&self, email: &str) -> String {
        let code = thread_rng().gen_range(100_000..=999_999).to_string();
        let mut codes = self.codes.lock().unwrap_or_else(|e| e.into_inner());
        codes.retain(|_, (_, issued)| issued.elapsed() < self.ttl);
        codes.insert(email.to_string(), (code.clone(), Instant::now()));
        code
    }

    /// Consume the pending code for `email` if it matches and has not expired
    pub fn verify(&self, email: &str, code: &str) -> bool {
        let mut codes = self.codes.lock().unwrap_or_else(|e| e.into_inner());
        let Some((expected, issued)) = codes.remove(email) else {
            return false;
        };

        if issued.elapsed() >= self.ttl {
            return false;
        }
        if expected == code.trim() {
            return true;
        }

        codes.insert(email.to_string(), (expected, issued));
        false
    }
}
