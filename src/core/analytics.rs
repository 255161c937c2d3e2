//! Session aggregation over an engagement time series.
//!
//! Input is an ordered series of `(timestamp, score)` points. Points without a
//! score are kept in the timeline and count toward `total_points`, but every
//! statistic below is computed over the defined scores only.

use crate::core::scoring::{AttentionInputs, AttentionScoring, BandedMeanScoring};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Volatility below this is "high stability".
pub const HIGH_STABILITY_MAX: f64 = 0.2;
/// Volatility below this (and not high) is "medium stability".
pub const MEDIUM_STABILITY_MAX: f64 = 0.35;

/// Report truncation limits.
const TOP_DROPOFFS: usize = 5;
const TOP_PEAKS: usize = 3;
const TOP_SPIKES: usize = 5;

/// One sample of a session's engagement series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScorePoint {
    pub timestamp: DateTime<Utc>,
    /// Engagement in `[0, 1]`; `None` when the sample carried no score
    #[serde(default)]
    pub score: Option<f64>,
}

impl ScorePoint {
    pub fn new(timestamp: DateTime<Utc>, score: f64) -> Self {
        Self {
            timestamp,
            score: Some(score),
        }
    }
}

/// Thresholds for the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Scores strictly above this count as focused
    pub focus_threshold: f64,
    /// Minimum consecutive drop reported as a distraction spike
    pub spike_threshold: f64,
    /// Spike drops at or above this are `high` severity
    pub severe_drop: f64,
    /// Scores strictly above this belong to a `high` sustained run
    pub sustained_threshold: f64,
    /// Runs shorter than this are discarded as noise
    pub min_sustained_secs: i64,
    /// Consecutive drops strictly above this are dropoffs
    pub dropoff_threshold: f64,
    /// Samples per peak window
    pub peak_window: usize,
    /// Window averages strictly above this are peaks
    pub peak_threshold: f64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            focus_threshold: 0.7,
            spike_threshold: 0.3,
            severe_drop: 0.5,
            sustained_threshold: 0.7,
            min_sustained_secs: 60,
            dropoff_threshold: 0.3,
            peak_window: 5,
            peak_threshold: 0.75,
        }
    }
}

/// Mean, population standard deviation and range of the defined scores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BasicStats {
    pub avg_score: f64,
    pub std_score: f64,
    pub min_score: f64,
    pub max_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Medium,
    High,
}

/// A sharp drop between two consecutive samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistractionSpike {
    /// Time of the lower sample
    pub timestamp: DateTime<Utc>,
    pub drop: f64,
    pub severity: Severity,
    pub from_score: f64,
    pub to_score: f64,
}

/// Stability class derived from volatility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StabilityLabel {
    #[serde(rename = "high stability")]
    High,
    #[serde(rename = "medium stability")]
    Medium,
    #[serde(rename = "low stability")]
    Low,
}

impl std::fmt::Display for StabilityLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            StabilityLabel::High => "high stability",
            StabilityLabel::Medium => "medium stability",
            StabilityLabel::Low => "low stability",
        };
        f.write_str(label)
    }
}

/// Classify a volatility value: `< 0.2` high, `< 0.35` medium, else low.
pub fn stability_label(volatility: f64) -> StabilityLabel {
    if volatility < HIGH_STABILITY_MAX {
        StabilityLabel::High
    } else if volatility < MEDIUM_STABILITY_MAX {
        StabilityLabel::Medium
    } else {
        StabilityLabel::Low
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodKind {
    High,
    Low,
}

/// A maximal run of samples on one side of the sustained threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SustainedPeriod {
    #[serde(rename = "type")]
    pub kind: PeriodKind,
    pub start: DateTime<Utc>,
    /// From the first to the last sample of the run, whole seconds
    pub duration_sec: i64,
    pub avg_engagement: f64,
    pub points_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dropoff {
    pub timestamp: DateTime<Utc>,
    pub from_score: f64,
    pub to_score: f64,
    pub drop: f64,
}

/// A window of consecutive samples with a high average.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakPeriod {
    pub start_idx: usize,
    /// Exclusive
    pub end_idx: usize,
    pub avg_engagement: f64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// Fraction of samples in each engagement band.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    /// `< 0.33`
    pub low_engagement: f64,
    /// `[0.33, 0.67)`
    pub medium_engagement: f64,
    /// `>= 0.67`
    pub high_engagement: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDuration {
    pub duration_seconds: i64,
    pub duration_minutes: i64,
    pub duration_formatted: String,
}

impl SessionDuration {
    pub fn from_seconds(seconds: i64) -> Self {
        let seconds = seconds.max(0);
        Self {
            duration_seconds: seconds,
            duration_minutes: seconds / 60,
            duration_formatted: format_duration(seconds),
        }
    }
}

/// `"Xm Ys"`.
pub fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!("{}m {}s", seconds / 60, seconds % 60)
}

/// The advanced analytics payload served to dashboards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionAnalytics {
    /// 0-100
    pub attention_score: u32,
    pub focus_time_percentage: f64,
    pub distraction_spikes: Vec<DistractionSpike>,
    pub volatility: f64,
    pub sustained_periods: Vec<SustainedPeriod>,
}

impl SessionAnalytics {
    pub fn stability(&self) -> StabilityLabel {
        stability_label(self.volatility)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    #[serde(flatten)]
    pub stats: BasicStats,
    pub total_points: usize,
    #[serde(flatten)]
    pub duration: SessionDuration,
    pub attention_score: u32,
    pub focus_time_percentage: f64,
    pub volatility: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticalMoments {
    pub dropoffs: Vec<Dropoff>,
    pub peak_periods: Vec<PeakPeriod>,
    pub distraction_spikes: Vec<DistractionSpike>,
    pub total_dropoffs: usize,
    pub total_peaks: usize,
    pub total_spikes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SustainedEngagement {
    pub sustained_periods: Vec<SustainedPeriod>,
    pub high_focus_segments: Vec<SustainedPeriod>,
    pub low_attention_segments: Vec<SustainedPeriod>,
}

/// Everything the session report shows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComprehensiveAnalytics {
    pub summary: ReportSummary,
    pub distribution: Distribution,
    pub critical_moments: CriticalMoments,
    pub sustained_engagement: SustainedEngagement,
    pub timeline: Vec<ScorePoint>,
    pub computed_at: DateTime<Utc>,
}

/// Computes session analytics with a configurable attention score.
pub struct SessionAggregator {
    config: AnalyticsConfig,
    scoring: Box<dyn AttentionScoring>,
}

impl Default for SessionAggregator {
    fn default() -> Self {
        Self::new(AnalyticsConfig::default())
    }
}

impl std::fmt::Debug for SessionAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionAggregator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SessionAggregator {
    /// Aggregator using [`BandedMeanScoring`] for the attention score.
    pub fn new(config: AnalyticsConfig) -> Self {
        Self {
            config,
            scoring: Box::new(BandedMeanScoring),
        }
    }

    /// Replace the attention scoring function.
    pub fn with_scoring(mut self, scoring: impl AttentionScoring + 'static) -> Self {
        self.scoring = Box::new(scoring);
        self
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    pub fn basic_stats(&self, points: &[ScorePoint]) -> BasicStats {
        let scores: Vec<f64> = defined(points).map(|(_, s)| s).collect();
        if scores.is_empty() {
            return BasicStats::default();
        }

        let (min, max) = scores
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &s| {
                (lo.min(s), hi.max(s))
            });

        BasicStats {
            avg_score: scores.iter().mean(),
            std_score: scores.iter().population_std_dev(),
            min_score: min,
            max_score: max,
        }
    }

    /// Percentage of defined scores above the focus threshold, one decimal.
    pub fn focus_time_percentage(&self, points: &[ScorePoint]) -> f64 {
        let (focused, total) = defined(points).fold((0usize, 0usize), |(f, t), (_, s)| {
            (f + usize::from(s > self.config.focus_threshold), t + 1)
        });
        if total == 0 {
            return 0.0;
        }
        round_to(focused as f64 / total as f64 * 100.0, 1)
    }

    /// Sample standard deviation of the defined scores, three decimals.
    pub fn volatility(&self, points: &[ScorePoint]) -> f64 {
        let scores: Vec<f64> = defined(points).map(|(_, s)| s).collect();
        if scores.len() < 2 {
            return 0.0;
        }
        round_to(scores.iter().std_dev(), 3)
    }

    /// Attention score through the configured scoring function, 0 for an
    /// empty series.
    pub fn attention_score(&self, points: &[ScorePoint]) -> u32 {
        let scores: Vec<f64> = defined(points).map(|(_, s)| s).collect();
        if scores.is_empty() {
            return 0;
        }

        let inputs = AttentionInputs {
            mean: scores.iter().mean(),
            volatility: self.volatility(points),
            focus_time_percentage: self.focus_time_percentage(points),
        };
        self.scoring.attention_score(&inputs).min(100)
    }

    /// Consecutive drops of at least `spike_threshold`, in series order.
    pub fn distraction_spikes(&self, points: &[ScorePoint]) -> Vec<DistractionSpike> {
        consecutive_pairs(points)
            .filter_map(|((_, from), (ts, to))| {
                let drop = from - to;
                (drop >= self.config.spike_threshold).then(|| DistractionSpike {
                    timestamp: ts,
                    drop: round_to(drop, 2),
                    severity: if drop >= self.config.severe_drop {
                        Severity::High
                    } else {
                        Severity::Medium
                    },
                    from_score: round_to(from, 2),
                    to_score: round_to(to, 2),
                })
            })
            .collect()
    }

    /// Maximal high/low runs lasting at least `min_sustained_secs`.
    pub fn sustained_periods(&self, points: &[ScorePoint]) -> Vec<SustainedPeriod> {
        let samples: Vec<(DateTime<Utc>, f64)> = defined(points).collect();
        if samples.len() < 2 {
            return Vec::new();
        }

        let kind_of = |score: f64| {
            if score > self.config.sustained_threshold {
                PeriodKind::High
            } else {
                PeriodKind::Low
            }
        };

        let mut periods = Vec::new();
        let mut run_start = 0;
        for i in 1..=samples.len() {
            let run_ends =
                i == samples.len() || kind_of(samples[i].1) != kind_of(samples[run_start].1);
            if !run_ends {
                continue;
            }

            let run = &samples[run_start..i];
            let start = run[0].0;
            let duration_sec = (run[run.len() - 1].0 - start).num_seconds();
            if duration_sec >= self.config.min_sustained_secs {
                let sum: f64 = run.iter().map(|(_, s)| s).sum();
                periods.push(SustainedPeriod {
                    kind: kind_of(run[0].1),
                    start,
                    duration_sec,
                    avg_engagement: round_to(sum / run.len() as f64, 2),
                    points_count: run.len(),
                });
            }
            run_start = i;
        }
        periods
    }

    /// Consecutive drops above `dropoff_threshold`, largest first.
    pub fn dropoffs(&self, points: &[ScorePoint]) -> Vec<Dropoff> {
        let mut dropoffs: Vec<Dropoff> = consecutive_pairs(points)
            .filter_map(|((_, from), (ts, to))| {
                let drop = from - to;
                (drop > self.config.dropoff_threshold).then(|| Dropoff {
                    timestamp: ts,
                    from_score: round_to(from, 3),
                    to_score: round_to(to, 3),
                    drop: round_to(drop, 3),
                })
            })
            .collect();
        dropoffs.sort_by(|a, b| b.drop.total_cmp(&a.drop));
        dropoffs
    }

    /// Sliding windows whose average exceeds `peak_threshold`, best first.
    pub fn peak_periods(&self, points: &[ScorePoint]) -> Vec<PeakPeriod> {
        let samples: Vec<(DateTime<Utc>, f64)> = defined(points).collect();
        let window = self.config.peak_window;
        if window == 0 || samples.len() < window {
            return Vec::new();
        }

        let mut peaks: Vec<PeakPeriod> = samples
            .windows(window)
            .enumerate()
            .filter_map(|(i, w)| {
                let avg = w.iter().map(|(_, s)| s).sum::<f64>() / window as f64;
                (avg > self.config.peak_threshold).then(|| PeakPeriod {
                    start_idx: i,
                    end_idx: i + window,
                    avg_engagement: round_to(avg, 3),
                    start_time: w[0].0,
                    end_time: w[window - 1].0,
                })
            })
            .collect();
        peaks.sort_by(|a, b| b.avg_engagement.total_cmp(&a.avg_engagement));
        peaks
    }

    pub fn distribution(&self, points: &[ScorePoint]) -> Distribution {
        let scores: Vec<f64> = defined(points).map(|(_, s)| s).collect();
        if scores.is_empty() {
            return Distribution::default();
        }

        let total = scores.len() as f64;
        let share = |pred: &dyn Fn(f64) -> bool| {
            round_to(scores.iter().filter(|&&s| pred(s)).count() as f64 / total, 3)
        };

        Distribution {
            low_engagement: share(&|s: f64| s < 0.33),
            medium_engagement: share(&|s: f64| (0.33..0.67).contains(&s)),
            high_engagement: share(&|s: f64| s >= 0.67),
        }
    }

    /// Time from the first to the last point, floored to whole seconds.
    pub fn duration(&self, points: &[ScorePoint]) -> SessionDuration {
        match (points.first(), points.last()) {
            (Some(first), Some(last)) => {
                SessionDuration::from_seconds((last.timestamp - first.timestamp).num_seconds())
            }
            _ => SessionDuration::from_seconds(0),
        }
    }

    /// The dashboard's advanced analytics.
    pub fn advanced(&self, points: &[ScorePoint]) -> SessionAnalytics {
        SessionAnalytics {
            attention_score: self.attention_score(points),
            focus_time_percentage: self.focus_time_percentage(points),
            distraction_spikes: self.distraction_spikes(points),
            volatility: self.volatility(points),
            sustained_periods: self.sustained_periods(points),
        }
    }

    /// Full report analytics, with critical moments truncated to the top few.
    pub fn comprehensive(&self, points: &[ScorePoint]) -> ComprehensiveAnalytics {
        let dropoffs = self.dropoffs(points);
        let peaks = self.peak_periods(points);
        let spikes = self.distraction_spikes(points);
        let sustained = self.sustained_periods(points);

        let (high_focus_segments, low_attention_segments): (Vec<_>, Vec<_>) = sustained
            .iter()
            .cloned()
            .partition(|p| p.kind == PeriodKind::High);

        ComprehensiveAnalytics {
            summary: ReportSummary {
                stats: self.basic_stats(points),
                total_points: points.len(),
                duration: self.duration(points),
                attention_score: self.attention_score(points),
                focus_time_percentage: self.focus_time_percentage(points),
                volatility: self.volatility(points),
            },
            distribution: self.distribution(points),
            critical_moments: CriticalMoments {
                total_dropoffs: dropoffs.len(),
                total_peaks: peaks.len(),
                total_spikes: spikes.len(),
                dropoffs: dropoffs.into_iter().take(TOP_DROPOFFS).collect(),
                peak_periods: peaks.into_iter().take(TOP_PEAKS).collect(),
                distraction_spikes: spikes.into_iter().take(TOP_SPIKES).collect(),
            },
            sustained_engagement: SustainedEngagement {
                sustained_periods: sustained,
                high_focus_segments,
                low_attention_segments,
            },
            timeline: points.to_vec(),
            computed_at: Utc::now(),
        }
    }
}

/// Plain-text session report.
pub fn summary_report(analytics: &ComprehensiveAnalytics) -> String {
    let s = &analytics.summary;
    let d = &analytics.distribution;
    let c = &analytics.critical_moments;
    let e = &analytics.sustained_engagement;

    format!(
        "SESSION ENGAGEMENT REPORT\n\
         \n\
         Key Statistics:\n\
         - Average Engagement: {:.1}%\n\
         - Attention Score: {}/100 ({})\n\
         - Focus Time: {:.1}%\n\
         - Peak Engagement: {:.1}%\n\
         - Lowest Engagement: {:.1}%\n\
         - Volatility: {:.3} ({})\n\
         - Session Duration: {}\n\
         \n\
         Engagement Breakdown:\n\
         - High Engagement (>67%): {:.1}%\n\
         - Medium Engagement (33-67%): {:.1}%\n\
         - Low Engagement (<33%): {:.1}%\n\
         \n\
         Attention Issues:\n\
         - Total Distraction Spikes: {}\n\
         - Engagement Dropoffs: {}\n\
         \n\
         Focus Performance:\n\
         - Sustained High Focus Periods: {}\n\
         - Low Attention Segments: {}\n\
         \n\
         Generated: {}",
        s.stats.avg_score * 100.0,
        s.attention_score,
        crate::core::scoring::attention_label(s.attention_score),
        s.focus_time_percentage,
        s.stats.max_score * 100.0,
        s.stats.min_score * 100.0,
        s.volatility,
        stability_label(s.volatility),
        s.duration.duration_formatted,
        d.high_engagement * 100.0,
        d.medium_engagement * 100.0,
        d.low_engagement * 100.0,
        c.total_spikes,
        c.total_dropoffs,
        e.high_focus_segments.len(),
        e.low_attention_segments.len(),
        analytics.computed_at.to_rfc3339(),
    )
}

fn defined(points: &[ScorePoint]) -> impl Iterator<Item = (DateTime<Utc>, f64)> + '_ {
    points
        .iter()
        .filter_map(|p| p.score.filter(|s| s.is_finite()).map(|s| (p.timestamp, s)))
}

fn consecutive_pairs(
    points: &[ScorePoint],
) -> impl Iterator<Item = ((DateTime<Utc>, f64), (DateTime<Utc>, f64))> + '_ {
    defined(points).zip(defined(points).skip(1))
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn series(scores: &[f64], spacing_secs: i64) -> Vec<ScorePoint> {
        scores
            .iter()
            .enumerate()
            .map(|(i, &s)| ScorePoint::new(at(i as i64 * spacing_secs), s))
            .collect()
    }

    /// 70 samples, 15 s apart, alternating 0.9 and 0.2 every 5 samples.
    fn alternating() -> Vec<ScorePoint> {
        let scores: Vec<f64> = (0..70)
            .map(|i| if (i / 5) % 2 == 0 { 0.9 } else { 0.2 })
            .collect();
        series(&scores, 15)
    }

    #[test]
    fn test_alternating_spikes() {
        let agg = SessionAggregator::default();
        let points = alternating();
        let spikes = agg.distraction_spikes(&points);

        assert_eq!(spikes.len(), 7);
        for (n, spike) in spikes.iter().enumerate() {
            assert_eq!(spike.timestamp, points[5 + n * 10].timestamp);
            assert_eq!(spike.from_score, 0.9);
            assert_eq!(spike.to_score, 0.2);
            assert_eq!(spike.drop, 0.7);
            assert_eq!(spike.severity, Severity::High);
        }
    }

    #[test]
    fn test_alternating_sustained_periods() {
        let agg = SessionAggregator::default();
        let periods = agg.sustained_periods(&alternating());

        assert_eq!(periods.len(), 14);
        for (n, period) in periods.iter().enumerate() {
            let expected = if n % 2 == 0 {
                PeriodKind::High
            } else {
                PeriodKind::Low
            };
            assert_eq!(period.kind, expected);
            assert_eq!(period.points_count, 5);
            assert_eq!(period.duration_sec, 60);
            assert_eq!(period.start, at(n as i64 * 75));
        }
        assert_eq!(periods[0].avg_engagement, 0.9);
        assert_eq!(periods[1].avg_engagement, 0.2);
    }

    #[test]
    fn test_short_runs_are_excluded() {
        let agg = SessionAggregator::default();
        // Same shape, 1 s apart: every run lasts 4 s.
        let scores: Vec<f64> = alternating().iter().filter_map(|p| p.score).collect();
        assert!(agg.sustained_periods(&series(&scores, 1)).is_empty());

        let lenient = SessionAggregator::new(AnalyticsConfig {
            min_sustained_secs: 4,
            ..AnalyticsConfig::default()
        });
        assert_eq!(lenient.sustained_periods(&series(&scores, 1)).len(), 14);
    }

    #[test]
    fn test_alternating_summary_metrics() {
        let agg = SessionAggregator::default();
        let points = alternating();

        assert_eq!(agg.focus_time_percentage(&points), 50.0);
        assert_eq!(agg.volatility(&points), 0.353);
        assert_eq!(agg.attention_score(&points), 50);

        let stats = agg.basic_stats(&points);
        assert!((stats.avg_score - 0.55).abs() < 1e-9);
        assert!((stats.std_score - 0.35).abs() < 1e-9);
        assert_eq!(stats.min_score, 0.2);
        assert_eq!(stats.max_score, 0.9);

        let duration = agg.duration(&points);
        assert_eq!(duration.duration_seconds, 69 * 15);
        assert_eq!(duration.duration_formatted, "17m 15s");
    }

    #[test]
    fn test_comprehensive_truncates_critical_moments() {
        let agg = SessionAggregator::default();
        let report = agg.comprehensive(&alternating());
        let critical = &report.critical_moments;

        assert_eq!(critical.total_spikes, 7);
        assert_eq!(critical.distraction_spikes.len(), 5);
        assert_eq!(critical.total_dropoffs, 7);
        assert_eq!(critical.dropoffs.len(), 5);
        assert_eq!(critical.total_peaks, 20);
        assert_eq!(critical.peak_periods.len(), 3);
        assert_eq!(critical.peak_periods[0].avg_engagement, 0.9);

        assert_eq!(report.sustained_engagement.high_focus_segments.len(), 7);
        assert_eq!(report.sustained_engagement.low_attention_segments.len(), 7);
        assert_eq!(report.summary.total_points, 70);
        assert_eq!(report.timeline.len(), 70);
        assert_eq!(report.distribution.low_engagement, 0.5);
        assert_eq!(report.distribution.high_engagement, 0.5);
    }

    #[test]
    fn test_volatility_labels() {
        assert_eq!(stability_label(0.15), StabilityLabel::High);
        assert_eq!(stability_label(0.30), StabilityLabel::Medium);
        assert_eq!(stability_label(0.50), StabilityLabel::Low);
        assert_eq!(stability_label(0.2), StabilityLabel::Medium);
        assert_eq!(stability_label(0.35), StabilityLabel::Low);
        assert_eq!(StabilityLabel::High.to_string(), "high stability");
    }

    #[test]
    fn test_undefined_scores_are_ignored() {
        let agg = SessionAggregator::default();
        let points = vec![
            ScorePoint::new(at(0), 0.4),
            ScorePoint {
                timestamp: at(5),
                score: None,
            },
            ScorePoint::new(at(10), 0.8),
        ];

        let stats = agg.basic_stats(&points);
        assert!((stats.avg_score - 0.6).abs() < 1e-9);
        assert_eq!(stats.min_score, 0.4);
        assert_eq!(stats.max_score, 0.8);

        let report = agg.comprehensive(&points);
        assert_eq!(report.summary.total_points, 3);
        assert_eq!(report.summary.duration.duration_seconds, 10);
    }

    #[test]
    fn test_empty_series() {
        let agg = SessionAggregator::default();
        let analytics = agg.advanced(&[]);
        assert_eq!(analytics.attention_score, 0);
        assert_eq!(analytics.focus_time_percentage, 0.0);
        assert_eq!(analytics.volatility, 0.0);
        assert!(analytics.distraction_spikes.is_empty());
        assert!(analytics.sustained_periods.is_empty());

        let report = agg.comprehensive(&[]);
        assert_eq!(report.summary.stats, BasicStats::default());
        assert_eq!(report.summary.duration.duration_formatted, "0m 0s");
    }

    #[test]
    fn test_spike_threshold_and_severity() {
        let agg = SessionAggregator::default();
        let points = series(&[0.9, 0.55, 0.5, 0.1, 0.4], 1);
        let spikes = agg.distraction_spikes(&points);

        assert_eq!(spikes.len(), 2);
        assert_eq!(spikes[0].severity, Severity::Medium);
        assert_eq!(spikes[0].drop, 0.35);
        assert_eq!(spikes[1].severity, Severity::Medium);
        assert_eq!(spikes[1].timestamp, at(3));
    }

    #[test]
    fn test_dropoffs_sorted_by_drop() {
        let agg = SessionAggregator::default();
        let points = series(&[0.9, 0.5, 0.9, 0.1, 0.6, 0.2], 1);
        let drops: Vec<f64> = agg.dropoffs(&points).iter().map(|d| d.drop).collect();
        assert_eq!(drops, vec![0.8, 0.4, 0.4]);
    }

    #[test]
    fn test_custom_attention_scoring() {
        let agg = SessionAggregator::default()
            .with_scoring(|i: &AttentionInputs| (i.focus_time_percentage * 2.0) as u32);
        // 100% focus doubled is clamped to 100.
        let points = series(&[0.9, 0.95, 0.8], 1);
        assert_eq!(agg.attention_score(&points), 100);

        let stable = SessionAggregator::default().with_scoring(|i: &AttentionInputs| {
            if stability_label(i.volatility) == StabilityLabel::High {
                90
            } else {
                10
            }
        });
        assert_eq!(stable.attention_score(&points), 90);
    }

    #[test]
    fn test_summary_report_text() {
        let agg = SessionAggregator::default();
        let report = agg.comprehensive(&alternating());
        let text = summary_report(&report);

        assert!(text.starts_with("SESSION ENGAGEMENT REPORT"));
        assert!(text.contains("Attention Score: 50/100 (Fair)"));
        assert!(text.contains("Focus Time: 50.0%"));
        assert!(text.contains("Session Duration: 17m 15s"));
        assert!(text.contains("Total Distraction Spikes: 7"));
        assert!(text.contains("low stability"));
    }

    #[test]
    fn test_report_wire_shape() {
        let agg = SessionAggregator::default();
        let points = vec![
            ScorePoint::new(at(0), 0.9),
            ScorePoint::new(at(0) + Duration::seconds(90), 0.8),
        ];
        let json = serde_json::to_value(agg.comprehensive(&points)).unwrap();

        assert_eq!(json["summary"]["duration_formatted"], "1m 30s");
        assert_eq!(json["summary"]["total_points"], 2);
        assert!(json["summary"]["avg_score"].is_number());
        assert_eq!(json["sustained_engagement"]["sustained_periods"][0]["type"], "high");
        assert!(json["critical_moments"]["total_spikes"].is_number());
    }
}
