// main.rs - Entry point: 跨交易所账户汇总、持仓风险、资金费收入与流动性调拨

use colored::Colorize;
use env_logger::Env;
use log::{info, warn, LevelFilter};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::io::Write;
use std::str::FromStr;
use std::sync::Arc;

use crossvault::config::{get_config, init_config, Config};
use crossvault::connectors::UsdcOrder;
use crossvault::funding::join_rates;
use crossvault::risk::{margin_usage_pct, LiquidationAlert, MarginRisk};
use crossvault::{
    AccountAggregator, AccountRef, AccountType, EngineError, FundingAggregator, LiquidityRebalancer, PriceOracle,
    Result, RiskAnalyzer, WithdrawRequest, Workflows,
};

const USAGE: &str = "用法: crossvault [--config path] [--user id] <command>
  balance
  positions [account]
  funding [days]
  rates <account> <symbol> [days]
  ensure <account> <coin> <account_type> <required>
  leverage <account> <symbol> <n>
  withdraw <account> <coin> <network> <address> <amount> [memo]
  buy_usdc <account> market <amount> | limit <amount> <price>
  transfer <account> <from> <to> <coin> <amount>
  earn <account> position | subscribe <coin> <amount> | redeem <coin> [amount]";

struct CliArgs {
    config_path: String,
    user: Option<String>,
    command: Vec<String>,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<CliArgs> {
    let mut cli = CliArgs {
        config_path: String::from("config.toml"),
        user: None,
        command: Vec::new(),
    };
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                cli.config_path = args.next().ok_or_else(|| EngineError::Config("--config 缺少路径".to_string()))?;
            }
            "--user" | "-u" => {
                cli.user = Some(args.next().ok_or_else(|| EngineError::Config("--user 缺少用户id".to_string()))?);
            }
            _ => cli.command.push(arg),
        }
    }
    Ok(cli)
}

fn arg<'a>(command: &'a [String], index: usize, name: &str) -> Result<&'a str> {
    command
        .get(index)
        .map(String::as_str)
        .ok_or_else(|| EngineError::Config(format!("缺少参数 <{name}>\n{USAGE}")))
}

fn decimal_arg(command: &[String], index: usize, name: &str) -> Result<Decimal> {
    let raw = arg(command, index, name)?;
    Decimal::from_str(raw).map_err(|_| EngineError::Parse(format!("<{name}> 不是数字: {raw}")))
}

fn u32_arg(command: &[String], index: usize, name: &str) -> Result<u32> {
    let raw = arg(command, index, name)?;
    raw.parse()
        .map_err(|_| EngineError::Parse(format!("<{name}> 不是整数: {raw}")))
}

fn optional_u32(command: &[String], index: usize, name: &str, default: u32) -> Result<u32> {
    if command.get(index).is_some() {
        u32_arg(command, index, name)
    } else {
        Ok(default)
    }
}

fn optional_decimal(command: &[String], index: usize, name: &str) -> Result<Option<Decimal>> {
    if command.get(index).is_some() {
        decimal_arg(command, index, name).map(Some)
    } else {
        Ok(None)
    }
}

fn find_account<'a>(accounts: &'a [AccountRef], id: &str) -> Result<&'a AccountRef> {
    accounts
        .iter()
        .find(|a| a.account_id.eq_ignore_ascii_case(id) || a.exchange_key.eq_ignore_ascii_case(id))
        .ok_or_else(|| EngineError::Config(format!("账户不存在: {id}")))
}

fn money(value: Decimal) -> String {
    format!("{:.2}", value)
}

fn signed(value: Decimal) -> colored::ColoredString {
    let text = money(value);
    if value.is_sign_negative() {
        text.red()
    } else {
        text.green()
    }
}

async fn show_balances(aggregator: &AccountAggregator, accounts: &[AccountRef], threshold: Decimal) {
    let report = aggregator.aggregate_balances(accounts).await;

    for account in &report.accounts {
        println!("\n{}", format!("== {} ({}) ==", account.account.display_name, account.account.family).bold());
        if let Some(error) = &account.error {
            println!("  {} {}", "查询失败:".red(), error);
            continue;
        }
        println!("  {:<10} {:>18} {:>12} {:>14}", "币种", "数量", "价格", "价值(USD)");
        for holding in account.display_holdings(threshold) {
            println!(
                "  {:<10} {:>18} {:>12} {:>14}",
                holding.coin,
                holding.amount.normalize(),
                money(holding.price_usd),
                money(holding.value_usd)
            );
        }
        if let Some(total) = account.total_usd {
            println!("  {} {}", "合计:".cyan(), money(total));
        }
    }

    println!("\n{}", "== 按交易所 ==".bold());
    for exchange in &report.by_exchange {
        println!("  {:<12} {:>3} 个账户 {:>14}", exchange.family.to_string(), exchange.accounts, money(exchange.total_usd));
    }

    println!("\n{}", "== 资金分布 ==".bold());
    for entry in &report.distribution {
        let bar = "█".repeat((entry.share_pct / Decimal::from(2)).to_usize().unwrap_or(0));
        println!(
            "  {:<16} {:>14} {:>6}% {}",
            entry.display_name,
            money(entry.total_usd),
            money(entry.share_pct),
            bar.blue()
        );
    }

    for user in &report.by_user {
        println!("  用户 {} 合计: {}", user.user_id, money(user.total_usd));
    }
    println!("\n{} {}", "总资产(USD):".bold(), money(report.grand_total_usd).bold());

    let failed: Vec<_> = report.failed_accounts().map(|a| a.account.display_name.clone()).collect();
    if !failed.is_empty() {
        println!("{} {}", "未计入:".yellow(), failed.join(", "));
    }
}

async fn show_positions(analyzer: &RiskAnalyzer, accounts: &[AccountRef]) {
    for account in accounts {
        println!("\n{}", format!("== {} ({}) ==", account.display_name, account.family).bold());
        let book = match analyzer.fetch_positions(account).await {
            Ok(book) => book,
            Err(e) => {
                println!("  {} {}", "查询失败:".red(), e);
                continue;
            }
        };
        if book.is_empty() {
            println!("  无持仓");
        }
        for position in &book.positions {
            let distance = position
                .distance_to_liquidation_pct()
                .map(|d| format!("{}%", money(d)))
                .unwrap_or_else(|| "-".to_string());
            let distance = match LiquidationAlert::for_position(position) {
                Some(LiquidationAlert::Critical) => distance.red().bold(),
                Some(LiquidationAlert::Warning) => distance.yellow(),
                None => distance.normal(),
            };
            println!(
                "  {:<14} {:<5} {:>14} {:>12} {:>14} {:>5} {:>10}",
                position.symbol,
                position.side.as_str(),
                position.size.normalize(),
                position.mark_price.normalize(),
                signed(position.unrealized_pnl),
                position.leverage.map(|l| format!("{l}x")).unwrap_or_default(),
                distance
            );
        }
        println!("  名义价值: {}  未实现盈亏: {}", money(book.total_notional), signed(book.total_pnl));

        if account.family.is_direct_http() {
            match analyzer.fetch_margin_summary(account).await {
                Ok(Some(summary)) => {
                    let usage = margin_usage_pct(&summary);
                    println!(
                        "  账户价值: {}  已用保证金: {}  可提取: {}  使用率: {}% ({})",
                        money(summary.account_value),
                        money(summary.margin_used),
                        money(summary.withdrawable),
                        money(usage),
                        MarginRisk::from_usage_pct(usage)
                    );
                }
                Ok(None) => {}
                Err(e) => warn!("[{}] 保证金概况查询失败: {}", account.display_name, e),
            }
        }
    }
}

async fn show_funding(funding: &FundingAggregator, accounts: &[AccountRef], days: u32) {
    let (report, failures) = funding.daily_report(accounts, days).await;

    println!("\n{}", format!("== 最近 {} 天资金费收入 ==", report.days).bold());
    for bucket in &report.by_day {
        println!("  {} {:>4} 笔 {:>12}", bucket.date, bucket.count, signed(bucket.income));
    }
    println!("\n{}", "== 按币种 ==".bold());
    for coin in &report.by_coin {
        println!("  {:<14} {:>4} 笔 {:>12}", coin.symbol, coin.count, signed(coin.total_income));
    }
    println!(
        "\n  合计: {}  日均: {}  年化: {}",
        signed(report.grand_total),
        signed(report.avg_daily_income),
        signed(report.annualized_income)
    );
    for (account, error) in failures {
        println!("  {} {}: {}", "未计入".yellow(), account.display_name, error);
    }
}

async fn show_rates(funding: &FundingAggregator, account: &AccountRef, symbol: &str, days: u32) -> Result<()> {
    let records = funding.fetch_records(account, days).await?;
    let rates = funding.fetch_rates(account, symbol, days).await?;
    println!("\n{}", format!("== {} {} 费率与收入 ==", account.display_name, symbol).bold());
    for day in join_rates(&records, &rates, symbol) {
        let cell = |v: Option<Decimal>, scale: u32| v.map(|d| d.round_dp(scale).to_string()).unwrap_or_else(|| "-".into());
        println!(
            "  {} {:>14} {:>10}% {:>12}",
            day.date,
            cell(day.rate_sum, 6),
            cell(day.annualized_rate, 2),
            cell(day.income, 4)
        );
    }
    Ok(())
}

async fn run(cli: CliArgs, config: &Config) -> Result<()> {
    let user = config.resolve_user(cli.user.as_deref())?;
    let accounts = config.account_refs(user)?;
    let executors = config.build_executors(user)?;
    let oracle = PriceOracle::new(Arc::new(config.build_ticker()?));
    let command = &cli.command;

    match arg(command, 0, "command")? {
        "balance" => {
            let aggregator = AccountAggregator::new(executors, oracle);
            show_balances(&aggregator, &accounts, config.display.dust_threshold_usd).await;
        }
        "positions" => {
            let analyzer = RiskAnalyzer::new(executors);
            let selected = match command.get(1) {
                Some(id) => vec![find_account(&accounts, id)?.clone()],
                None => accounts.clone(),
            };
            show_positions(&analyzer, &selected).await;
        }
        "funding" => {
            let days = optional_u32(command, 1, "days", 7)?;
            show_funding(&FundingAggregator::new(executors), &accounts, days).await;
        }
        "rates" => {
            let account = find_account(&accounts, arg(command, 1, "account")?)?;
            let symbol = arg(command, 2, "symbol")?.to_ascii_uppercase();
            let days = optional_u32(command, 3, "days", 7)?;
            show_rates(&FundingAggregator::new(executors), account, &symbol, days).await?;
        }
        "ensure" => {
            let account = find_account(&accounts, arg(command, 1, "account")?)?;
            let coin = arg(command, 2, "coin")?;
            let target: AccountType = arg(command, 3, "account_type")?.parse()?;
            let required = decimal_arg(command, 4, "required")?;
            let aggregator = AccountAggregator::new(executors, oracle);
            let outcome = LiquidityRebalancer::new(&aggregator)
                .ensure_liquidity(account, coin, target, required, config.rebalance.buffer)
                .await?;
            let verdict = if outcome.permits_action() { "可以继续".green() } else { "不能继续".red() };
            println!("{:?}\n{}", outcome, verdict);
        }
        "leverage" => {
            let account = find_account(&accounts, arg(command, 1, "account")?)?;
            let symbol = arg(command, 2, "symbol")?;
            let leverage = u32_arg(command, 3, "n")?;
            let analyzer = RiskAnalyzer::new(executors);
            let mut book = analyzer.fetch_positions(account).await?;
            analyzer.apply_leverage_update(account, &mut book, symbol, leverage).await?;
            if let Some(position) = book.get(symbol) {
                println!("{} {} -> {}x", "已修改".green(), position.symbol, leverage);
            }
        }
        "withdraw" => {
            let account = find_account(&accounts, arg(command, 1, "account")?)?;
            let request = WithdrawRequest {
                coin: arg(command, 2, "coin")?.to_string(),
                network: arg(command, 3, "network")?.to_string(),
                address: arg(command, 4, "address")?.to_string(),
                amount: decimal_arg(command, 5, "amount")?,
                memo: command.get(6).cloned(),
            };
            let aggregator = AccountAggregator::new(executors, oracle);
            let receipt = Workflows::new(&aggregator, config.rebalance.buffer)
                .withdraw(account, request)
                .await?;
            println!("{:?}\n{}", receipt.rebalance, receipt.reply);
        }
        "buy_usdc" => {
            let account = find_account(&accounts, arg(command, 1, "account")?)?;
            let order = match arg(command, 2, "market|limit")? {
                "market" => UsdcOrder::Market {
                    amount: decimal_arg(command, 3, "amount")?,
                },
                "limit" => UsdcOrder::Limit {
                    amount: decimal_arg(command, 3, "amount")?,
                    price: decimal_arg(command, 4, "price")?,
                },
                other => return Err(EngineError::Config(format!("未知订单类型: {other}\n{USAGE}"))),
            };
            let aggregator = AccountAggregator::new(executors, oracle);
            let receipt = Workflows::new(&aggregator, config.rebalance.buffer)
                .buy_usdc(account, order)
                .await?;
            println!("{:?}\n{}", receipt.rebalance, receipt.reply);
        }
        "transfer" => {
            let account = find_account(&accounts, arg(command, 1, "account")?)?;
            let from: AccountType = arg(command, 2, "from")?.parse()?;
            let to: AccountType = arg(command, 3, "to")?.parse()?;
            let coin = arg(command, 4, "coin")?;
            let amount = decimal_arg(command, 5, "amount")?;
            let aggregator = AccountAggregator::new(executors, oracle);
            let receipt = Workflows::new(&aggregator, config.rebalance.buffer)
                .transfer(account, from, to, coin, amount)
                .await?;
            println!("{} {} -> {} {} {}\n{}", "已划转".green(), from, to, amount.normalize(), coin, receipt.reply);
        }
        "earn" => {
            let account = find_account(&accounts, arg(command, 1, "account")?)?;
            let aggregator = AccountAggregator::new(executors, oracle);
            let workflows = Workflows::new(&aggregator, config.rebalance.buffer);
            let receipt = match arg(command, 2, "position|subscribe|redeem")? {
                "position" => {
                    println!("\n{}", format!("== {} 活期理财 ==", account.display_name).bold());
                    for position in workflows.earn_positions(account).await? {
                        println!("  {:<10} {:>18}", position.coin, position.amount.normalize());
                    }
                    return Ok(());
                }
                "subscribe" => {
                    let coin = arg(command, 3, "coin")?;
                    workflows.earn_subscribe(account, coin, decimal_arg(command, 4, "amount")?).await?
                }
                "redeem" => {
                    let coin = arg(command, 3, "coin")?;
                    workflows.earn_redeem(account, coin, optional_decimal(command, 4, "amount")?).await?
                }
                other => return Err(EngineError::Config(format!("未知理财操作: {other}\n{USAGE}"))),
            };
            println!("{:?}\n{}", receipt.rebalance, receipt.reply);
        }
        other => {
            return Err(EngineError::Config(format!("未知命令: {other}\n{USAGE}")));
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = parse_args(std::env::args().skip(1))?;

    // Load configuration from file
    if let Err(e) = init_config(&cli.config_path).await {
        eprintln!("Error loading configuration: {e}");
        eprintln!("Falling back to default configuration");
    }

    // Configure logging based on configuration
    env_logger::Builder::from_env(Env::default().default_filter_or(&get_config().general.log_level))
        .format(|buf, record| {
            // Use a more minimal format for regular logs
            if record.level() <= log::Level::Info {
                writeln!(buf, "[{}] {}", record.level(), record.args())
            } else {
                writeln!(
                    buf,
                    "[{} {}:{}] {}",
                    record.level(),
                    record.file().unwrap_or("unknown"),
                    record.line().unwrap_or(0),
                    record.args()
                )
            }
        })
        .filter_module("tokio", LevelFilter::Warn)
        .filter_module("hyper", LevelFilter::Warn)
        .filter_module("reqwest", LevelFilter::Warn)
        .format_timestamp_millis()
        .init();

    if cli.command.is_empty() {
        println!("{USAGE}");
        return Ok(());
    }

    info!("crossvault 启动, 配置: {}", cli.config_path);
    run(cli, get_config()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(line: &str) -> Vec<String> {
        line.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn leverage_requires_explicit_value() {
        let missing = command("leverage binance BTCUSDT");
        match u32_arg(&missing, 3, "n") {
            Err(EngineError::Config(message)) => assert!(message.contains("<n>")),
            other => panic!("expected missing <n>, got {other:?}"),
        }
        assert_eq!(u32_arg(&command("leverage binance BTCUSDT 10"), 3, "n").unwrap(), 10);
        assert!(matches!(u32_arg(&command("leverage binance BTCUSDT ten"), 3, "n"), Err(EngineError::Parse(_))));
    }

    #[test]
    fn optional_arguments_fall_back_only_when_absent() {
        assert_eq!(optional_u32(&command("funding"), 1, "days", 7).unwrap(), 7);
        assert_eq!(optional_u32(&command("funding 30"), 1, "days", 7).unwrap(), 30);
        assert!(optional_u32(&command("funding week"), 1, "days", 7).is_err());
        assert_eq!(optional_decimal(&command("earn binance redeem USDT"), 4, "amount").unwrap(), None);
    }

    #[test]
    fn global_flags_are_split_from_command() {
        let args = ["--user", "eb65", "leverage", "-c", "prod.toml", "binance"].map(String::from);
        let cli = parse_args(args.into_iter()).unwrap();
        assert_eq!(cli.user.as_deref(), Some("eb65"));
        assert_eq!(cli.config_path, "prod.toml");
        assert_eq!(cli.command, command("leverage binance"));
        assert!(parse_args(["--config"].map(String::from).into_iter()).is_err());
    }
}
