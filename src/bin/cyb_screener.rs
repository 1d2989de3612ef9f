use cyb_screener::config::Config;
use cyb_screener::report;
use cyb_screener::scrapers::arrow_file::ArrowFileSource;
use cyb_screener::scrapers::base::MarketDataSource;
use cyb_screener::scrapers::szse::SZSEScraper;
use cyb_screener::screening::normalizer::SeriesLoader;
use cyb_screener::screening::predicates;
use cyb_screener::screening::screener::Screener;
use cyb_screener::services::fetcher::RetryingFetcher;
use cyb_screener::services::universe::{is_board_symbol, UniverseCache};

use anyhow::{anyhow, bail, Context};
use chrono::NaiveDate;
use clap::{Arg, ArgMatches, Command};
use log::{error, info, warn};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::watch;

/// screen 和 inspect 共用的参数
fn common_args<'a>(cmd: Command<'a>) -> Command<'a> {
    cmd.arg(
        Arg::new("source")
            .long("source")
            .value_name("SOURCE")
            .help("Market data source (szse, arrow)")
            .takes_value(true)
            .default_value("szse"),
    )
    .arg(
        Arg::new("data-file")
            .long("data-file")
            .value_name("PATH")
            .help("DataHub stock.arrow snapshot, used with --source arrow")
            .takes_value(true)
            .default_value("data/stock.arrow"),
    )
    .arg(
        Arg::new("date")
            .short('d')
            .long("date")
            .value_name("DATE")
            .help("As-of date (YYYY-MM-DD); defaults to today, or the snapshot's latest date for arrow")
            .takes_value(true),
    )
    .arg(
        Arg::new("config")
            .short('c')
            .long("config")
            .value_name("CONFIG")
            .help("JSON configuration file")
            .takes_value(true),
    )
    .arg(value_arg("workers", "Number of concurrent workers"))
    .arg(value_arg("limit-up-days", "Limit-up lookback in sessions (default 60)"))
    .arg(value_arg("return-days", "Return window in sessions (default 15)"))
    .arg(value_arg("min-return", "Minimum return in percent, strictly greater (default 10)"))
    .arg(value_arg("decline-days", "Consecutive-decline lookback in sessions (default 3)"))
    .arg(value_arg("limit-up-rate", "Limit-up rate (default 0.10)"))
}

fn value_arg<'a>(name: &'a str, help: &'a str) -> Arg<'a> {
    Arg::new(name)
        .long(name)
        .value_name("VALUE")
        .help(help)
        .takes_value(true)
        .allow_hyphen_values(true)
}

/// 解析可选参数，格式错误直接报错而不是静默使用默认值
fn parse_opt<T: FromStr>(matches: &ArgMatches, name: &str) -> anyhow::Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match matches.value_of(name) {
        Some(raw) => raw.parse::<T>()
            .map(Some)
            .map_err(|e| anyhow!("invalid --{} '{}': {}", name, raw, e)),
        None => Ok(None),
    }
}

fn load_config(matches: &ArgMatches) -> anyhow::Result<Config> {
    let mut config = match matches.value_of("config") {
        Some(path) => Config::from_json_file(path)?,
        None => Config::new(),
    };

    if let Some(workers) = parse_opt(matches, "workers")? {
        config = config.with_workers(workers);
    }
    if let Some(days) = parse_opt(matches, "limit-up-days")? {
        config = config.with_limit_up_lookback(days);
    }
    if let Some(days) = parse_opt(matches, "return-days")? {
        config = config.with_return_window(days);
    }
    if let Some(pct) = parse_opt(matches, "min-return")? {
        config = config.with_min_return_pct(pct);
    }
    if let Some(days) = parse_opt(matches, "decline-days")? {
        config = config.with_decline_lookback(days);
    }
    if let Some(rate) = parse_opt(matches, "limit-up-rate")? {
        config = config.with_limit_up_rate(rate);
    }

    // 回看窗口变长时，保留的交易日数跟着变长
    let longest = config.screen.limit_up_lookback
        .max(config.screen.return_window)
        .max(config.screen.decline_lookback);
    if config.history_days < longest {
        config = config.with_history_days(longest);
    }

    Ok(config)
}

/// 根据 --source 创建数据源，并确定 as-of 日期
fn open_source(matches: &ArgMatches) -> anyhow::Result<(Arc<dyn MarketDataSource + Send + Sync>, NaiveDate)> {
    let date = match matches.value_of("date") {
        Some(raw) => Some(NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .with_context(|| format!("invalid --date '{}'", raw))?),
        None => None,
    };
    let today = chrono::Local::now().date_naive();

    match matches.value_of("source").unwrap_or("szse").to_lowercase().as_str() {
        "szse" => {
            let source: Arc<dyn MarketDataSource + Send + Sync> = Arc::new(SZSEScraper::new()?);
            Ok((source, date.unwrap_or(today)))
        }
        "arrow" => {
            let path = matches.value_of("data-file").unwrap_or("data/stock.arrow");
            let snapshot = ArrowFileSource::open(path)
                .with_context(|| format!("cannot open snapshot {}", path))?;
            let as_of = date.or_else(|| snapshot.latest_trading_date()).unwrap_or(today);
            let source: Arc<dyn MarketDataSource + Send + Sync> = Arc::new(snapshot);
            Ok((source, as_of))
        }
        other => bail!("Unknown source: {}", other),
    }
}

/// 命令行显式给出的调试参数才覆盖配置文件
fn apply_debug_overrides(mut config: Config, debug_mode: Option<bool>, debug_stock_limit: Option<usize>) -> Config {
    if let Some(debug_mode) = debug_mode {
        config = config.with_debug_mode(debug_mode);
    }
    if let Some(limit) = debug_stock_limit {
        config = config.with_debug_stock_limit(limit);
    }
    config
}

async fn run_screen(
    matches: &ArgMatches,
    debug_mode: Option<bool>,
    debug_stock_limit: Option<usize>,
) -> anyhow::Result<()> {
    let config = apply_debug_overrides(load_config(matches)?, debug_mode, debug_stock_limit);
    config.validate()?;
    info!("Configuration loaded: {:?}", config.screen);

    let (source, as_of) = open_source(matches)?;
    let fetcher = Arc::new(RetryingFetcher::new(source, config.retry.clone()));

    let cache = UniverseCache::new();
    let mut universe = (*cache.get_or_refresh(&fetcher, as_of).await?).clone();
    if config.debug_mode {
        universe = universe.truncated(config.debug_stock_limit);
    }
    println!("创业板股票数量: {}", universe.len());
    if universe.is_empty() {
        warn!("No board stocks found for {}", as_of);
    }

    let loader = Arc::new(SeriesLoader::new(fetcher.clone(), config.history_days, config.screen.limit_up_rate));
    let screener = Screener::new(loader, config.screen.clone(), config.workers);

    // Ctrl-C 只停止领取新股票，已完成的部分照常输出
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received Ctrl-C, stopping after in-flight stocks");
            let _ = shutdown_tx.send(true);
        }
    });

    let result = screener.run(&universe, as_of, shutdown_rx).await;
    let table = report::build(&result.matches, screener.params());
    report::log_result(&table, &result);
    println!("{}:\n{}", table.title, table);

    if let Some(path) = matches.value_of("output") {
        table.save(path).with_context(|| format!("cannot write report to {}", path))?;
        info!("Report written to {}", path);
    }

    Ok(())
}

async fn run_inspect(matches: &ArgMatches) -> anyhow::Result<()> {
    let symbol = matches.value_of("symbol").ok_or_else(|| anyhow!("--symbol is required"))?;
    if !is_board_symbol(symbol) {
        warn!("{} is outside the 300/301 board", symbol);
    }

    let config = load_config(matches)?;
    config.validate()?;

    let (source, as_of) = open_source(matches)?;
    let fetcher = Arc::new(RetryingFetcher::new(source, config.retry.clone()));
    let loader = SeriesLoader::new(fetcher, config.history_days, config.screen.limit_up_rate);

    let series = loader.load(symbol, as_of).await;
    if series.is_empty() {
        println!("No data for {} as of {}", symbol, as_of);
        return Ok(());
    }

    let params = &config.screen;
    println!("{:<12} {:>10} {:>10} {:>14} {:>6}", "Date", "PreClose", "Close", "Volume", "ZT");
    println!("{:-<56}", "");
    for session in series.sessions() {
        println!(
            "{:<12} {:>10.2} {:>10.2} {:>14} {:>6}",
            session.date.format("%Y-%m-%d").to_string(),
            session.prior_close,
            session.close,
            session.volume,
            if session.is_limit_up { "Y" } else { "" }
        );
    }

    let limit_up_window = series.tail(params.limit_up_lookback);
    let return_pct = predicates::n_session_return(series.sessions(), params.return_window);
    println!();
    println!("{}日涨停次数: {}", params.limit_up_lookback, predicates::count_limit_up(limit_up_window));
    println!("{}日涨幅(%): {:.2} (阈值 >{})", params.return_window, return_pct, params.min_return_pct);
    println!(
        "近{}日连续价跌量缩: {}",
        params.decline_lookback,
        predicates::has_consecutive_decline_with_volume_contraction(series.tail(params.decline_lookback))
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let screen_cmd = common_args(Command::new("screen").about("Screen 300/301 board stocks"))
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("PATH")
                .help("Write the report to a .json or .arrow file")
                .takes_value(true),
        );

    let inspect_cmd = common_args(Command::new("inspect").about("Show one symbol's series and predicate values"))
        .arg(
            Arg::new("symbol")
                .short('s')
                .long("symbol")
                .value_name("SYMBOL")
                .help("Stock symbol to inspect")
                .required(true)
                .takes_value(true),
        );

    let app = Command::new("cyb_screener")
        .version(env!("CARGO_PKG_VERSION"))
        .about("创业板形态选股：近期涨停 + 区间涨幅 + 连续价跌量缩")
        .subcommand(screen_cmd)
        .subcommand(inspect_cmd);

    // 在开发模式下添加调试参数
    #[cfg(debug_assertions)]
    let app = app.arg(
        Arg::new("debug")
            .long("debug")
            .help("Enable debug mode")
            .takes_value(false),
    )
    .arg(
        Arg::new("debug-limit")
            .long("debug-limit")
            .help("Limit the number of stocks to process in debug mode (default 10)")
            .takes_value(true),
    );

    let matches = app.get_matches();

    #[cfg(debug_assertions)]
    let debug_mode = matches.is_present("debug").then_some(true);
    #[cfg(not(debug_assertions))]
    let debug_mode = None;

    #[cfg(debug_assertions)]
    let debug_stock_limit = parse_opt::<usize>(&matches, "debug-limit")?;
    #[cfg(not(debug_assertions))]
    let debug_stock_limit = None;

    let outcome = match matches.subcommand() {
        Some(("screen", sub)) => run_screen(sub, debug_mode, debug_stock_limit).await,
        Some(("inspect", sub)) => run_inspect(sub).await,
        _ => {
            info!("No command specified. Use --help for usage information.");
            Ok(())
        }
    };

    if let Err(e) = &outcome {
        error!("{:#}", e);
    }
    outcome
}
