use crate::config::ScreenParams;
use crate::models::screen::{MatchRecord, ScreeningResult, SkippedSymbol};
use crate::models::series::Series;
use crate::screening::normalizer::SeriesLoader;
use crate::screening::predicates;
use crate::services::universe::Universe;
use crate::util;
use chrono::NaiveDate;
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinError;

// 每处理这么多只股票打印一次进度
const PROGRESS_EVERY: usize = 100;

/// 单只股票的处理结果
#[derive(Debug)]
enum Outcome {
    Matched(MatchRecord),
    Rejected,
    Skipped(String),
}

/// 对一只股票的序列计算三个条件，全部满足时生成 MatchRecord
pub fn screen_series(symbol: &str, name: &str, series: &Series, params: &ScreenParams) -> Option<MatchRecord> {
    let latest = series.latest()?;

    let limit_up_window = series.tail(params.limit_up_lookback);
    if !predicates::has_limit_up(limit_up_window) {
        return None;
    }

    let return_pct = predicates::n_session_return(series.sessions(), params.return_window);
    if !predicates::return_exceeds(return_pct, params.min_return_pct) {
        return None;
    }

    if !predicates::has_consecutive_decline_with_volume_contraction(series.tail(params.decline_lookback)) {
        return None;
    }

    Some(MatchRecord {
        symbol: symbol.to_string(),
        name: name.to_string(),
        latest_close: latest.close,
        limit_up_count: predicates::count_limit_up(limit_up_window),
        return_pct: util::round2(return_pct),
        consecutive_decline: true,
    })
}

/// 创业板选股器
///
/// 固定数量的 worker 从共享队列中领取股票，各自取数、计算，
/// 结果通过一个 channel 汇总。worker 之间没有共享的可变状态。
pub struct Screener {
    loader: Arc<SeriesLoader>,
    params: ScreenParams,
    workers: usize,
}

impl Screener {
    pub fn new(loader: Arc<SeriesLoader>, params: ScreenParams, workers: usize) -> Self {
        Self {
            loader,
            params,
            workers: workers.max(1),
        }
    }

    pub fn params(&self) -> &ScreenParams {
        &self.params
    }

    /// 运行到结束，不可取消
    pub async fn run_to_completion(&self, universe: &Universe, as_of: NaiveDate) -> ScreeningResult {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        self.run(universe, as_of, shutdown_rx).await
    }

    /// 筛选整个股票范围
    ///
    /// shutdown 变为 true 后不再领取新股票，正在处理的股票被放弃，
    /// 已完成的部分照常返回并标记 cancelled。
    pub async fn run(
        &self,
        universe: &Universe,
        as_of: NaiveDate,
        shutdown: watch::Receiver<bool>,
    ) -> ScreeningResult {
        let total = universe.len();
        let universe = Arc::new(universe.clone());
        let params = Arc::new(self.params.clone());
        let next = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));
        let (tx, mut rx) = mpsc::channel::<(usize, Outcome)>(self.workers * 4);

        info!("Screening {} stocks as of {} with {} workers", total, as_of, self.workers);

        let mut handles = Vec::with_capacity(self.workers);
        for worker_id in 0..self.workers.min(total.max(1)) {
            let universe = universe.clone();
            let next = next.clone();
            let done = done.clone();
            let tx = tx.clone();
            let loader = self.loader.clone();
            let params = params.clone();
            let mut shutdown = shutdown.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    if *shutdown.borrow() {
                        debug!("worker {} stopping on shutdown", worker_id);
                        break;
                    }

                    let idx = next.fetch_add(1, Ordering::SeqCst);
                    let symbol = match universe.stocks().get(idx) {
                        Some(stock) => stock.symbol.clone(),
                        None => break,
                    };
                    let name = universe.name_of(&symbol).map(str::to_string);

                    // 每只股票单独一个任务，panic 只影响这一只
                    let mut task = tokio::spawn(screen_stock(
                        loader.clone(),
                        params.clone(),
                        symbol.clone(),
                        name,
                        as_of,
                    ));

                    let outcome = tokio::select! {
                        biased;
                        _ = wait_for_shutdown(&mut shutdown) => {
                            task.abort();
                            debug!("worker {} abandoned {} on shutdown", worker_id, symbol);
                            break;
                        }
                        joined = &mut task => match joined {
                            Ok(outcome) => outcome,
                            Err(e) => {
                                let reason = task_failure(e);
                                error!("Skipping {}: {}", symbol, reason);
                                Outcome::Skipped(reason)
                            }
                        },
                    };

                    let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
                    if finished % PROGRESS_EVERY == 0 || finished == total {
                        info!("Progress: {}/{}", finished, total);
                    }

                    if tx.send((idx, outcome)).await.is_err() {
                        break;
                    }
                }
            }));
        }
        drop(tx);

        let mut outcomes = Vec::with_capacity(total);
        while let Some(item) = rx.recv().await {
            outcomes.push(item);
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Screening worker failed: {}", e);
            }
        }

        // 按股票范围的顺序输出，与完成顺序无关
        outcomes.sort_by_key(|(idx, _)| *idx);

        let mut result = ScreeningResult {
            scanned: outcomes.len(),
            cancelled: *shutdown.borrow() && outcomes.len() < total,
            ..ScreeningResult::default()
        };

        for (idx, outcome) in outcomes {
            match outcome {
                Outcome::Matched(record) => result.matches.push(record),
                Outcome::Rejected => {}
                Outcome::Skipped(reason) => result.skipped.push(SkippedSymbol {
                    symbol: universe.stocks()[idx].symbol.clone(),
                    reason,
                }),
            }
        }

        if result.cancelled {
            warn!("Screening cancelled after {}/{} stocks", result.scanned, total);
        }
        info!(
            "Screening finished: {} scanned, {} matched, {} skipped",
            result.scanned,
            result.matches.len(),
            result.skipped.len()
        );
        result
    }
}

async fn screen_stock(
    loader: Arc<SeriesLoader>,
    params: Arc<ScreenParams>,
    symbol: String,
    name: Option<String>,
    as_of: NaiveDate,
) -> Outcome {
    let series = match loader.try_load(&symbol, as_of).await {
        Ok(series) => series,
        Err(e) => {
            warn!("Skipping {}: {}", symbol, e);
            return Outcome::Skipped(e.to_string());
        }
    };

    let name = name.unwrap_or_else(|| {
        warn!("No display name for {}", symbol);
        String::new()
    });

    match screen_series(&symbol, &name, &series, &params) {
        Some(record) => {
            info!("创业板股票 {} 满足条件", record.symbol);
            Outcome::Matched(record)
        }
        None => Outcome::Rejected,
    }
}

/// 单只股票的任务没有正常结束时的跳过原因
fn task_failure(e: JoinError) -> String {
    if !e.is_panic() {
        return e.to_string();
    }
    let payload = e.into_panic();
    let message = payload.downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("panicked: {}", message)
}

/// 等到 shutdown 变为 true；发送端已关闭时永不返回
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
