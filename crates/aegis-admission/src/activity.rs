//! Behavioral anomaly scoring over per-user request patterns.
//!
//! A bounded ring of recent requests is kept per user. Five dimensions
//! each contribute a bounded non-negative addend to a suspiciousness
//! score clamped to `[0, 100]`: rapid-fire bursts, raw volume, sub-human
//! inter-arrival gaps, unnaturally uniform gaps, and repetition of the
//! same job target.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// One observed request.
#[derive(Debug, Clone)]
pub struct RequestPattern {
    /// The requesting user.
    pub user_id: String,
    /// When the request arrived.
    pub at: Instant,
    /// Logical action, e.g. `"job_trigger"`.
    pub action: String,
    /// Originating channel, when known.
    pub channel: Option<String>,
    /// Job type, when the request targets a job.
    pub job_type: Option<String>,
    /// Job name, when the request targets a job.
    pub job_name: Option<String>,
}

impl RequestPattern {
    /// Creates a pattern stamped now.
    pub fn new(user_id: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            at: Instant::now(),
            action: action.into(),
            channel: None,
            job_type: None,
            job_name: None,
        }
    }

    /// Sets the job target.
    pub fn with_job(mut self, job_type: impl Into<String>, job_name: impl Into<String>) -> Self {
        self.job_type = Some(job_type.into());
        self.job_name = Some(job_name.into());
        self
    }

    /// Sets the channel.
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }
}

/// Why a user looked suspicious.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspicionFlag {
    /// Burst above the rapid-request threshold.
    RapidRequests,
    /// Sustained volume above the volume threshold.
    HighVolume,
    /// Most gaps shorter than a human could produce.
    SubHumanInterval,
    /// Gap variance too low for a human.
    UniformIntervals,
    /// Nearly all requests target the same job.
    TargetRepetition,
}

/// Result of analyzing a user's recent activity.
#[derive(Debug, Clone)]
pub struct ActivityAnalysis {
    /// Whether the score crossed the suspicious threshold.
    pub is_suspicious: bool,
    /// Score in `[0, 100]`.
    pub score: f64,
    /// Dimensions that contributed.
    pub flags: Vec<SuspicionFlag>,
}

/// Tuning for the monitor.
#[derive(Debug, Clone)]
pub struct ActivityConfig {
    /// Ring capacity per user.
    pub max_patterns_per_user: usize,
    /// Burst window.
    pub rapid_request_window: Duration,
    /// Requests within the burst window considered rapid.
    pub rapid_request_threshold: usize,
    /// Volume window.
    pub volume_window: Duration,
    /// Requests within the volume window considered excessive.
    pub volume_threshold: usize,
    /// Gaps below this are not humanly producible.
    pub min_human_interval: Duration,
    /// Coefficient of variation below which gaps count as uniform.
    pub uniformity_cv_threshold: f64,
    /// Fraction of requests to one target that counts as repetition.
    pub repetition_threshold: f64,
    /// Score at or above which a user is suspicious.
    pub suspicious_score_threshold: f64,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            max_patterns_per_user: 200,
            rapid_request_window: Duration::from_secs(10),
            rapid_request_threshold: 8,
            volume_window: Duration::from_secs(300),
            volume_threshold: 50,
            min_human_interval: Duration::from_millis(500),
            uniformity_cv_threshold: 0.15,
            repetition_threshold: 0.8,
            suspicious_score_threshold: 60.0,
        }
    }
}

/// Rolling per-user pattern log and scorer.
pub struct ActivityMonitor {
    config: ActivityConfig,
    patterns: Mutex<HashMap<String, VecDeque<RequestPattern>>>,
}

impl ActivityMonitor {
    /// Creates a monitor.
    pub fn new(config: ActivityConfig) -> Self {
        Self {
            config,
            patterns: Mutex::new(HashMap::new()),
        }
    }

    /// The monitor's configuration.
    pub fn config(&self) -> &ActivityConfig {
        &self.config
    }

    /// Appends a request to the user's ring.
    pub fn record_request(&self, pattern: RequestPattern) {
        let mut patterns = self.patterns.lock().unwrap_or_else(|e| e.into_inner());
        let ring = patterns.entry(pattern.user_id.clone()).or_default();
        ring.push_back(pattern);
        while ring.len() > self.config.max_patterns_per_user {
            ring.pop_front();
        }
    }

    /// Drops a user's history.
    pub fn reset_user(&self, user_id: &str) {
        let mut patterns = self.patterns.lock().unwrap_or_else(|e| e.into_inner());
        patterns.remove(user_id);
    }

    /// Users with recorded activity.
    pub fn tracked_users(&self) -> usize {
        self.patterns.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Scores a user's recent activity.
    pub fn analyze(&self, user_id: &str) -> ActivityAnalysis {
        let patterns = self.patterns.lock().unwrap_or_else(|e| e.into_inner());
        let Some(ring) = patterns.get(user_id) else {
            return ActivityAnalysis {
                is_suspicious: false,
                score: 0.0,
                flags: Vec::new(),
            };
        };

        let now = Instant::now();
        let mut score = 0.0;
        let mut flags = Vec::new();

        // Rapid-fire burst.
        let rapid_count = ring
            .iter()
            .filter(|p| now.duration_since(p.at) <= self.config.rapid_request_window)
            .count();
        if rapid_count >= self.config.rapid_request_threshold {
            score += 30.0;
            flags.push(SuspicionFlag::RapidRequests);
        }

        // Raw volume.
        let volume_count = ring
            .iter()
            .filter(|p| now.duration_since(p.at) <= self.config.volume_window)
            .count();
        if volume_count >= self.config.volume_threshold {
            score += 20.0;
            flags.push(SuspicionFlag::HighVolume);
        }

        // Inter-arrival gaps.
        let gaps: Vec<f64> = ring
            .iter()
            .zip(ring.iter().skip(1))
            .map(|(a, b)| b.at.duration_since(a.at).as_secs_f64())
            .collect();

        if !gaps.is_empty() {
            let fast = gaps
                .iter()
                .filter(|g| **g < self.config.min_human_interval.as_secs_f64())
                .count();
            let fast_fraction = fast as f64 / gaps.len() as f64;
            score += 25.0 * fast_fraction;
            if fast_fraction >= 0.5 {
                flags.push(SuspicionFlag::SubHumanInterval);
            }
        }

        if gaps.len() >= 5 {
            let mean = gaps.iter().sum::<f64>() / gaps.len() as f64;
            if mean > 0.0 {
                let variance =
                    gaps.iter().map(|g| (g - mean).powi(2)).sum::<f64>() / gaps.len() as f64;
                let cv = variance.sqrt() / mean;
                if cv < self.config.uniformity_cv_threshold {
                    score += 15.0;
                    flags.push(SuspicionFlag::UniformIntervals);
                }
            }
        }

        // Target repetition.
        let mut targets: HashMap<(&str, &str), usize> = HashMap::new();
        let mut targeted = 0usize;
        for p in ring.iter() {
            if let (Some(jt), Some(jn)) = (p.job_type.as_deref(), p.job_name.as_deref()) {
                targeted += 1;
                *targets.entry((jt, jn)).or_insert(0) += 1;
            }
        }
        if targeted >= 5 {
            let top = targets.values().copied().max().unwrap_or(0);
            let fraction = top as f64 / targeted as f64;
            if fraction >= 0.5 {
                score += 20.0 * fraction;
            }
            if fraction >= self.config.repetition_threshold {
                flags.push(SuspicionFlag::TargetRepetition);
            }
        }

        let score = score.clamp(0.0, 100.0);
        ActivityAnalysis {
            is_suspicious: score >= self.config.suspicious_score_threshold,
            score,
            flags,
        }
    }
}
