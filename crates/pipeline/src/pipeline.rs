//! Parallel estimation run.
//!
//! One producer thread pulls from the block source into a bounded queue; a
//! pool of workers decodes and estimates blocks, each with its own histogram;
//! the calling thread collects results keyed by height. That map is the only
//! ordering point. Smoothing and consensus run afterwards on the calling
//! thread.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use crossbeam::channel::{bounded, Receiver, Sender};
use oracle_core::{
    Block, BlockEstimate, ConsensusResult, Error, EstimateSeries, Height, OracleConfig, RawBlock,
    Result, SmoothedSeries,
};
use oracle_estimation::{ConsensusAggregator, PriceEstimator, Smoother};
use oracle_ingestion::{peek_timestamp, BlockCache, BlockDecoder, BlockSource};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::bounds::{BoundCheck, RunBounds};
use crate::cancel::CancelToken;
use crate::report::ResultRecord;

/// Why the producer stopped pulling blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The source returned end of data.
    #[default]
    Exhausted,
    /// The end height was reached.
    HeightBound,
    /// A block past the requested day was seen.
    DayBound,
    /// The cancel token was set.
    Cancelled,
}

/// Counters describing a finished run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Blocks pulled from the source, including skipped ones.
    pub blocks_pulled: u64,
    /// Blocks pulled but below the requested range.
    pub blocks_skipped: u64,
    /// Blocks with an estimate (signal or not).
    pub blocks_estimated: u64,
    /// Blocks whose payload failed to decode.
    pub decode_failures: u64,
    /// Heights of those blocks.
    pub failed_heights: Vec<Height>,
    /// Estimated blocks without signal.
    pub no_signal: u64,
    /// Blocks served from the cache instead of decoded.
    pub cache_hits: u64,
    /// The run was cut short by the cancel token.
    pub cancelled: bool,
    pub stop_reason: StopReason,
}

/// Everything a run produces.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutput {
    /// Per-block estimates in height order.
    pub series: EstimateSeries,
    /// Smoothed trend over the signal blocks.
    pub smoothed: SmoothedSeries,
    /// Consensus over the whole window.
    pub consensus: ConsensusResult,
    pub summary: RunSummary,
    /// Day the run was bounded to, if any.
    pub date: Option<NaiveDate>,
    /// Template set used for classification.
    pub template_set_version: String,
}

impl RunOutput {
    /// The serializable result record.
    pub fn record(&self) -> ResultRecord {
        ResultRecord::from_output(self)
    }
}

enum Job {
    Decode(RawBlock),
    Cached(Arc<Block>),
}

enum Outcome {
    Estimated {
        estimate: BlockEstimate,
        /// Set when the block was decoded in this run.
        decoded: Option<Arc<Block>>,
    },
    Failed {
        height: Height,
        error: Error,
    },
}

#[derive(Default)]
struct ProducerStats {
    pulled: u64,
    skipped: u64,
    cache_hits: u64,
    stop_reason: StopReason,
}

/// Block-to-consensus pipeline with fixed configuration.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: OracleConfig,
    decoder: BlockDecoder,
    estimator: PriceEstimator,
    smoother: Smoother,
    consensus: ConsensusAggregator,
}

impl Pipeline {
    /// Validate `config` and build the shared read-only state.
    pub fn new(config: OracleConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            decoder: BlockDecoder::new(config.filters.clone()),
            estimator: PriceEstimator::from_config(&config)?,
            smoother: Smoother::from_config(&config.smoothing)?,
            consensus: ConsensusAggregator::from_config(&config.consensus),
            config,
        })
    }

    pub fn config(&self) -> &OracleConfig {
        &self.config
    }

    pub fn estimator(&self) -> &PriceEstimator {
        &self.estimator
    }

    /// Run over `source` until it is exhausted, a bound is reached or `cancel`
    /// is set.
    ///
    /// Undecodable blocks are logged, counted and skipped. Source failures and
    /// out-of-order heights abort the run.
    pub fn run<S: BlockSource>(
        &self,
        source: S,
        bounds: &RunBounds,
        cancel: &CancelToken,
        mut cache: Option<&mut BlockCache>,
    ) -> Result<RunOutput> {
        let workers = self.config.run.effective_workers();
        info!(
            workers,
            start = ?bounds.start_height,
            end = ?bounds.end_height,
            day = ?bounds.utc_day,
            "starting run"
        );

        let (job_tx, job_rx) = bounded::<Job>(self.config.run.queue_capacity);
        let (out_tx, out_rx) = bounded::<Outcome>(self.config.run.queue_capacity);

        let mut estimates: BTreeMap<Height, BlockEstimate> = BTreeMap::new();
        let mut decoded: Vec<Arc<Block>> = Vec::new();
        let mut summary = RunSummary::default();

        if let Some(cache) = cache.as_deref_mut() {
            cache.bind_policy(self.decoder.filter().config());
        }
        let lookup = cache.as_deref_mut();
        let produced = std::thread::scope(|scope| {
            let producer = scope.spawn(move || produce(source, bounds, cancel, lookup, job_tx));

            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let out_tx = out_tx.clone();
                scope.spawn(move || self.work(job_rx, out_tx));
            }
            drop(job_rx);
            drop(out_tx);

            for outcome in out_rx.iter() {
                match outcome {
                    Outcome::Estimated {
                        estimate,
                        decoded: block,
                    } => {
                        if let Some(block) = block {
                            decoded.push(block);
                        }
                        estimates.insert(estimate.height, estimate);
                    }
                    Outcome::Failed { height, error } => {
                        warn!(height, %error, "skipping undecodable block");
                        summary.decode_failures += 1;
                        summary.failed_heights.push(height);
                    }
                }
            }

            producer
                .join()
                .map_err(|_| Error::Other("block producer panicked".to_string()))?
        })?;

        if let Some(cache) = cache {
            decoded.sort_by_key(|b| b.height);
            for block in decoded {
                cache.insert(block);
            }
            let stats = cache.stats();
            debug!(
                cached = cache.len(),
                hit_rate = stats.hit_rate(),
                evictions = stats.evictions,
                "block cache updated"
            );
        }

        summary.failed_heights.sort_unstable();
        summary.blocks_pulled = produced.pulled;
        summary.blocks_skipped = produced.skipped;
        summary.cache_hits = produced.cache_hits;
        summary.stop_reason = produced.stop_reason;
        summary.cancelled = produced.stop_reason == StopReason::Cancelled;
        summary.blocks_estimated = estimates.len() as u64;

        let series = EstimateSeries::new(estimates.into_values().collect())?;
        summary.no_signal = series.no_signal_count() as u64;

        let smoothed = self.smoother.smooth(series.as_slice());
        let consensus = self.consensus.aggregate(&series, &smoothed);

        info!(
            blocks = summary.blocks_estimated,
            decode_failures = summary.decode_failures,
            no_signal = summary.no_signal,
            cache_hits = summary.cache_hits,
            stop = ?summary.stop_reason,
            price = ?consensus.price,
            "run finished"
        );

        Ok(RunOutput {
            series,
            smoothed,
            consensus,
            summary,
            date: bounds.utc_day,
            template_set_version: self.estimator.classifier().version().to_string(),
        })
    }

    /// Worker loop: one histogram, reused for every block.
    fn work(&self, jobs: Receiver<Job>, results: Sender<Outcome>) {
        let mut hist = self.estimator.new_histogram();

        for job in jobs.iter() {
            let outcome = match job {
                Job::Cached(block) => Outcome::Estimated {
                    estimate: self.estimator.estimate(&block, &mut hist),
                    decoded: None,
                },
                Job::Decode(raw) => match self.decoder.decode_raw(&raw) {
                    Ok(block) => {
                        let block = Arc::new(block);
                        Outcome::Estimated {
                            estimate: self.estimator.estimate(&block, &mut hist),
                            decoded: Some(block),
                        }
                    }
                    Err(error) => Outcome::Failed {
                        height: raw.height,
                        error,
                    },
                },
            };

            if let Outcome::Estimated { estimate, .. } = &outcome {
                debug!(
                    height = estimate.height,
                    outputs = estimate.output_count,
                    price = ?estimate.raw_price(),
                    "block estimated"
                );
            }
            if results.send(outcome).is_err() {
                break;
            }
        }
    }
}

/// Producer loop: pull, check order and bounds, hand off to the workers.
fn produce<S: BlockSource>(
    mut source: S,
    bounds: &RunBounds,
    cancel: &CancelToken,
    mut cache: Option<&mut BlockCache>,
    jobs: Sender<Job>,
) -> Result<ProducerStats> {
    let mut stats = ProducerStats::default();
    let mut previous: Option<Height> = None;

    loop {
        if cancel.is_cancelled() {
            stats.stop_reason = StopReason::Cancelled;
            break;
        }

        let Some(raw) = source.next_block()? else {
            stats.stop_reason = StopReason::Exhausted;
            break;
        };
        stats.pulled += 1;

        if let Some(previous) = previous {
            if raw.height <= previous {
                return Err(Error::OutOfOrder {
                    previous,
                    found: raw.height,
                });
            }
        }
        previous = Some(raw.height);

        let cached = cache.as_deref_mut().and_then(|c| c.get(raw.height));
        let timestamp = match &cached {
            Some(block) => Some(block.timestamp),
            None if bounds.needs_timestamp() => peek_timestamp(&raw.payload).ok(),
            None => None,
        };

        let check = bounds.check(raw.height, timestamp);
        match check {
            BoundCheck::Skip => {
                stats.skipped += 1;
                continue;
            }
            BoundCheck::Stop => {
                stats.stop_reason = if bounds.end_height.is_some_and(|end| raw.height > end) {
                    StopReason::HeightBound
                } else {
                    StopReason::DayBound
                };
                break;
            }
            BoundCheck::Take | BoundCheck::TakeLast => {}
        }

        let job = match cached {
            Some(block) => {
                stats.cache_hits += 1;
                Job::Cached(block)
            }
            None => Job::Decode(raw),
        };
        if jobs.send(job).is_err() {
            break;
        }

        if check == BoundCheck::TakeLast {
            stats.stop_reason = StopReason::HeightBound;
            break;
        }
    }

    Ok(stats)
}
