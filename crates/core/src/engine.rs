//! Arbitrage engine critical section: detect, size, gate, allocate,
//! recheck, execute, reconcile (spec §4.9).

use crate::allocator;
use crate::cache::OpportunityCache;
use crate::config::ArbitrageConfig;
use crate::cooldown::CooldownManager;
use crate::errors::CoreError;
use crate::events::{ArbitrageEvent, EventHub, OrderResultSummary};
use crate::exchange::{BookEvent, ExchangeClient, TradeSink};
use crate::execution_lock::ExecutionLock;
use crate::impact::{self, FillSimulation};
use crate::orderbook::{BookSide, OrderBook};
use crate::position::{Position, PositionMonitor};
use crate::risk::RiskManager;
use crate::scorer::{self, ScoringInput};
use crate::types::{Market, MarketPair, OrderResult, Side, Trade};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::time::timeout as tokio_timeout;

const BOOK_MAX_AGE_SECS: i64 = 2;
const ORDER_TIMEOUT_SECS: u64 = 3;
/// Effective prices are rounded up to this many decimals ("one tick") before
/// being sent as a limit order.
const TICK: Decimal = dec!(0.01);

/// Why the engine declined to act on a market this tick. Not an error: most
/// of these are expected steady-state outcomes, logged at debug level by the
/// caller rather than surfaced as incidents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    ExecutionLockHeld,
    EmptyBook,
    StaleBook,
    NoProfitableSize,
    CooldownActive,
    BelowQualityThreshold,
    TooManyConcurrentPositions,
    InsufficientBalance,
    RiskHalted,
    /// The size search found a profitable `n`, but capital allocation
    /// shrank the final size below `MIN_PROFIT_DOLLARS`.
    BelowMinProfit,
}

/// Outcome of one evaluate-and-execute pass over a market.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOutcome {
    Skipped(SkipReason),
    BothFilled { shares: Decimal, net_profit: Decimal },
    PartialFillUnwound,
    FillRejected,
}

/// The subset of book state the engine needs per market: YES and NO ask
/// books, keyed by token id.
struct MarketBooks {
    yes: OrderBook,
    no: OrderBook,
}

pub struct ArbitrageEngine {
    config: ArbitrageConfig,
    books: RwLock<HashMap<String, MarketBooks>>,
    cache: OpportunityCache,
    cooldown: CooldownManager,
    execution_lock: ExecutionLock,
    risk: Arc<RiskManager>,
    positions: Arc<PositionMonitor>,
    events: EventHub,
    exchange: Arc<dyn ExchangeClient>,
    trade_sink: Arc<dyn TradeSink>,
}

impl ArbitrageEngine {
    #[must_use]
    pub fn new(
        config: ArbitrageConfig,
        risk: Arc<RiskManager>,
        positions: Arc<PositionMonitor>,
        events: EventHub,
        exchange: Arc<dyn ExchangeClient>,
        trade_sink: Arc<dyn TradeSink>,
    ) -> Self {
        let cooldown = Duration::from_std(config.cooldown).unwrap_or(Duration::seconds(30));
        Self {
            config,
            books: RwLock::new(HashMap::new()),
            cache: OpportunityCache::new(),
            cooldown: CooldownManager::with_cooldown(cooldown),
            execution_lock: ExecutionLock::new(),
            risk,
            positions,
            events,
            exchange,
            trade_sink,
        }
    }

    pub async fn reset_book(&self, market: &Market, yes_bids: Vec<(Decimal, Decimal)>, yes_asks: Vec<(Decimal, Decimal)>, no_bids: Vec<(Decimal, Decimal)>, no_asks: Vec<(Decimal, Decimal)>, seq: u64) -> Result<(), CoreError> {
        let mut yes = OrderBook::new(market.yes_token.token_id.clone());
        yes.apply_snapshot(yes_bids, yes_asks, seq)?;
        let mut no = OrderBook::new(market.no_token.token_id.clone());
        no.apply_snapshot(no_bids, no_asks, seq)?;
        self.books.write().await.insert(market.market_id.clone(), MarketBooks { yes, no });
        self.events.publish(ArbitrageEvent::BookReset {
            market_id: market.market_id.clone(),
            exchange: market.exchange,
            at: Utc::now(),
        });
        Ok(())
    }

    /// Drains one token's book feed until `rx` closes, applying each
    /// snapshot/delta to the YES or NO side stored under `market_id`. Run one
    /// of these per venue/token as its own task; the market's entry must
    /// already exist (via `reset_book`) or updates are dropped, since a
    /// stray feed for an unregistered market has nowhere to write.
    pub async fn ingest_book(&self, market_id: &str, want_yes: bool, mut rx: mpsc::Receiver<BookEvent>) {
        while let Some(event) = rx.recv().await {
            let mut books = self.books.write().await;
            let Some(entry) = books.get_mut(market_id) else {
                continue;
            };
            let book = if want_yes { &mut entry.yes } else { &mut entry.no };
            let result = match event {
                BookEvent::Snapshot { bids, asks, seq } => book.apply_snapshot(bids, asks, seq),
                BookEvent::Delta { side, price, new_size, seq } => book.apply_delta(side, price, new_size, seq),
            };
            if let Err(err) = result {
                tracing::warn!(market_id, want_yes, error = %err, "dropped book update that would violate invariants");
            }
        }
    }

    /// The full evaluate-and-execute critical section for one market,
    /// guarded by its per-market execution lock.
    pub async fn evaluate_and_execute(&self, market: &Market, quality_score: Decimal) -> Result<EngineOutcome, CoreError> {
        let Some(_guard) = self.execution_lock.try_acquire(&market.market_id) else {
            return Ok(EngineOutcome::Skipped(SkipReason::ExecutionLockHeld));
        };

        // 1. Detect.
        let (yes_asks, no_asks) = match self.read_ask_levels(market).await {
            Some(levels) => levels,
            None => return Ok(EngineOutcome::Skipped(SkipReason::EmptyBook)),
        };

        // 2. Size search.
        let sizing = self.search_size(&yes_asks, &no_asks);
        let Some(sizing) = sizing else {
            return Ok(EngineOutcome::Skipped(SkipReason::NoProfitableSize));
        };

        // 3. Quality gates.
        if let Some(reason) = self.quality_gates(&market.market_id, quality_score).await {
            return Ok(EngineOutcome::Skipped(reason));
        }

        // 4. Allocate.
        let opportunity = self.build_opportunity(market, &yes_asks, &no_asks, &sizing);
        let risk_state = self.risk.snapshot();
        let balance = self
            .exchange
            .get_balance("USD")
            .await
            .unwrap_or(self.config.fallback_balance);
        let depth_fraction = (sizing.shares / top_of_book_depth(&yes_asks, &no_asks)).min(Decimal::ONE);
        let alloc_dollars = allocator::allocate(
            &opportunity,
            &risk_state,
            Utc::now(),
            self.config.capital_per_trade,
            self.config.max_daily_loss,
            balance,
            depth_fraction,
            sizing.yes_fill.effective_price + sizing.no_fill.effective_price,
        );
        let final_shares = sizing
            .shares
            .min((alloc_dollars / (sizing.yes_fill.effective_price + sizing.no_fill.effective_price)).floor())
            .max(Decimal::ZERO);
        if final_shares <= Decimal::ZERO {
            return Ok(EngineOutcome::Skipped(SkipReason::InsufficientBalance));
        }

        // 5. Slippage recheck.
        let (yes_asks_fresh, no_asks_fresh) = match self.read_ask_levels(market).await {
            Some(levels) => levels,
            None => return Ok(EngineOutcome::Skipped(SkipReason::EmptyBook)),
        };
        let yes_fill = impact::effective_price(&yes_asks_fresh, final_shares);
        let no_fill = impact::effective_price(&no_asks_fresh, final_shares);
        let (Some(yes_fill), Some(no_fill)) = (yes_fill, no_fill) else {
            self.events.publish(ArbitrageEvent::SlippageExceeded { market_id: market.market_id.clone(), at: Utc::now() });
            return Err(CoreError::slippage(market.market_id.clone(), "book depth vanished before execution"));
        };

        let moved = (yes_fill.effective_price - sizing.yes_fill.effective_price).abs() > self.config.max_slippage
            || (no_fill.effective_price - sizing.no_fill.effective_price).abs() > self.config.max_slippage;
        let fee_per_leg = self.config.trading_fee_percent;
        let total_cost = yes_fill.effective_price + no_fill.effective_price + fee_per_leg * (yes_fill.effective_price + no_fill.effective_price);
        if moved || total_cost > Decimal::ONE - self.config.min_profit_margin {
            // the edge moved against us between detection and execution, but
            // we still observed the market and should not re-evaluate it
            // again immediately.
            self.cooldown.record(&market.market_id, Utc::now());
            self.events.publish(ArbitrageEvent::SlippageExceeded { market_id: market.market_id.clone(), at: Utc::now() });
            return Err(CoreError::slippage(market.market_id.clone(), "effective price moved adversely past execution"));
        }

        // allocation can shrink the size the search validated; the profit
        // floor must hold at the size actually being executed, not just the
        // size the search found profitable.
        let profit_per_share = Decimal::ONE - total_cost;
        if final_shares * profit_per_share < self.config.min_profit_dollars {
            return Ok(EngineOutcome::Skipped(SkipReason::BelowMinProfit));
        }

        // 6. Execute.
        let yes_limit = round_up_tick(yes_fill.effective_price);
        let no_limit = round_up_tick(no_fill.effective_price);
        let yes_token = market.yes_token.token_id.clone();
        let no_token = market.no_token.token_id.clone();

        let order_fut = async {
            tokio::join!(
                self.exchange.place_order(&yes_token, Side::Yes, yes_limit, final_shares),
                self.exchange.place_order(&no_token, Side::No, no_limit, final_shares),
            )
        };
        let (yes_result, no_result) = match tokio_timeout(std::time::Duration::from_secs(ORDER_TIMEOUT_SECS), order_fut).await {
            Ok((y, n)) => (y.unwrap_or(OrderResult::Timeout), n.unwrap_or(OrderResult::Timeout)),
            Err(_) => (OrderResult::Timeout, OrderResult::Timeout),
        };

        // 7. Reconcile.
        let now = Utc::now();
        self.cooldown.record(&market.market_id, now);

        let outcome = self
            .reconcile(market, &yes_result, &no_result, final_shares, now)
            .await?;

        Ok(outcome)
    }

    async fn read_ask_levels(&self, market: &Market) -> Option<(Vec<(Decimal, Decimal)>, Vec<(Decimal, Decimal)>)> {
        let yes_asks = self.read_one_side(&market.market_id, true).await?;
        let no_asks = self.read_one_side(&market.market_id, false).await?;
        Some((yes_asks, no_asks))
    }

    /// Current best bid price for `side` on `market_id`'s book, `None` if the
    /// market is unregistered, stale, or that side is empty. Used by callers
    /// driving `PositionMonitor::tick` off live book state.
    pub async fn best_bid(&self, market_id: &str, side: Side) -> Option<Decimal> {
        let books = self.books.read().await;
        let entry = books.get(market_id)?;
        let book = match side {
            Side::Yes => &entry.yes,
            Side::No => &entry.no,
        };
        if book.is_stale(Duration::seconds(BOOK_MAX_AGE_SECS)) {
            return None;
        }
        book.best(BookSide::Bid).map(|(price, _)| price)
    }

    /// Reads one side's ask levels from the book registered under
    /// `market_id`, `None` if the book is missing, stale, or empty.
    /// Cross-venue opportunities read the YES side of `market_a`'s book and
    /// the NO side of `market_b`'s book via this same path.
    async fn read_one_side(&self, market_id: &str, want_yes: bool) -> Option<Vec<(Decimal, Decimal)>> {
        let books = self.books.read().await;
        let entry = books.get(market_id)?;
        let book = if want_yes { &entry.yes } else { &entry.no };
        if book.is_stale(Duration::seconds(BOOK_MAX_AGE_SECS)) {
            return None;
        }
        let asks = book.walk(BookSide::Ask, self.config.max_order_book_depth);
        if asks.is_empty() {
            return None;
        }
        Some(asks)
    }

    fn search_size(&self, yes_asks: &[(Decimal, Decimal)], no_asks: &[(Decimal, Decimal)]) -> Option<SizeResult> {
        let max_affordable = top_of_book_depth(yes_asks, no_asks);
        if max_affordable < Decimal::ONE {
            return None;
        }

        let fee = self.config.trading_fee_percent;
        let margin = self.config.min_profit_margin;
        let min_profit = self.config.min_profit_dollars;

        let satisfies = |n: Decimal| -> Option<(FillSimulation, FillSimulation)> {
            let yes = impact::effective_price(yes_asks, n)?;
            let no = impact::effective_price(no_asks, n)?;
            let total = yes.effective_price + no.effective_price + fee * (yes.effective_price + no.effective_price);
            let profit_per_share = Decimal::ONE - total;
            if total <= Decimal::ONE - margin && n * profit_per_share >= min_profit {
                Some((yes, no))
            } else {
                None
            }
        };

        let mut lo = Decimal::ONE;
        let mut hi = max_affordable.floor();
        let mut best: Option<(Decimal, FillSimulation, FillSimulation)> = None;

        // binary search for largest n satisfying the constraint; the
        // constraint is not guaranteed monotonic at the margins of available
        // depth, so fall back to the best candidate seen rather than
        // assuming failure at hi means failure at every larger n tried.
        while lo <= hi {
            let mid = ((lo + hi) / dec!(2)).floor();
            if mid < Decimal::ONE {
                break;
            }
            match satisfies(mid) {
                Some((yes, no)) => {
                    best = Some((mid, yes, no));
                    lo = mid + Decimal::ONE;
                }
                None => {
                    hi = mid - Decimal::ONE;
                }
            }
        }

        best.map(|(shares, yes_fill, no_fill)| SizeResult { shares, yes_fill, no_fill })
    }

    async fn quality_gates(&self, market_id: &str, quality_score: Decimal) -> Option<SkipReason> {
        let now = Utc::now();
        if !self.cooldown.can_trade(market_id, now) {
            return Some(SkipReason::CooldownActive);
        }
        if quality_score < self.config.min_market_quality_score {
            return Some(SkipReason::BelowQualityThreshold);
        }
        if self.positions.open_market_ids().await.len() >= self.config.max_concurrent_positions {
            return Some(SkipReason::TooManyConcurrentPositions);
        }
        if self.risk.halted(now) {
            self.events.publish(ArbitrageEvent::RiskHalted {
                daily_pnl: self.risk.snapshot().daily_pnl,
                at: now,
            });
            return Some(SkipReason::RiskHalted);
        }
        None
    }

    fn build_opportunity(
        &self,
        market: &Market,
        yes_asks: &[(Decimal, Decimal)],
        no_asks: &[(Decimal, Decimal)],
        sizing: &SizeResult,
    ) -> crate::types::Opportunity {
        let gross_cost = sizing.shares * (sizing.yes_fill.effective_price + sizing.no_fill.effective_price);
        let fees = self.config.trading_fee_percent * gross_cost;
        let net_profit = sizing.shares - gross_cost - fees;
        let roi = if gross_cost > Decimal::ZERO { net_profit / gross_cost } else { Decimal::ZERO };

        let opportunity = crate::types::Opportunity {
            market_id: market.market_id.clone(),
            yes_ask_levels: yes_asks.to_vec(),
            no_ask_levels: no_asks.to_vec(),
            shares: sizing.shares,
            gross_cost,
            fees,
            net_profit,
            roi,
            score: scorer::score(ScoringInput {
                volume: market.volume,
                top5_liquidity: gross_cost,
                spread: (sizing.yes_fill.effective_price - sizing.no_fill.effective_price).abs(),
                hours_to_resolution: (market.close_time - Utc::now()).num_minutes() as f64 / 60.0,
            }),
            observed_at: Utc::now(),
        };
        self.cache.insert(opportunity.clone());
        self.events.publish(ArbitrageEvent::OpportunityDetected {
            market_id: market.market_id.clone(),
            net_edge: roi,
            shares: sizing.shares,
            observed_at: opportunity.observed_at,
        });
        opportunity
    }

    async fn reconcile(
        &self,
        market: &Market,
        yes_result: &OrderResult,
        no_result: &OrderResult,
        shares: Decimal,
        now: chrono::DateTime<Utc>,
    ) -> Result<EngineOutcome, CoreError> {
        match (yes_result, no_result) {
            (OrderResult::Filled { price: yp, size: ys, fee: yf }, OrderResult::Filled { price: np, size: ns, fee: nf }) => {
                self.trade_sink
                    .record(Trade {
                        ts: now,
                        market_id: market.market_id.clone(),
                        token_id: market.yes_token.token_id.clone(),
                        side: Side::Yes,
                        price: *yp,
                        size: *ys,
                        fee: *yf,
                        exchange: market.exchange,
                    })
                    .await?;
                self.trade_sink
                    .record(Trade {
                        ts: now,
                        market_id: market.market_id.clone(),
                        token_id: market.no_token.token_id.clone(),
                        side: Side::No,
                        price: *np,
                        size: *ns,
                        fee: *nf,
                        exchange: market.exchange,
                    })
                    .await?;

                self.positions
                    .open(Position::open(market.market_id.clone(), shares, *yp, *np, now))
                    .await;
                self.events.publish(ArbitrageEvent::PositionOpened {
                    market_id: market.market_id.clone(),
                    shares,
                    at: now,
                });

                let net_profit = shares - shares * (*yp + *np) - (*yf + *nf);
                self.risk.record_trade(net_profit, now);
                self.events.publish(ArbitrageEvent::TradeExecuted {
                    market_id: market.market_id.clone(),
                    shares,
                    realized_profit: net_profit,
                    executed_at: now,
                });

                Ok(EngineOutcome::BothFilled { shares, net_profit })
            }
            (OrderResult::Filled { price, size, fee }, _) => {
                self.unwind_leg(market, Side::Yes, &market.yes_token.token_id, *price, *size, *fee, now)
                    .await
            }
            (_, OrderResult::Filled { price, size, fee }) => {
                self.unwind_leg(market, Side::No, &market.no_token.token_id, *price, *size, *fee, now)
                    .await
            }
            _ => {
                self.events.publish(ArbitrageEvent::FillRejected {
                    market_id: market.market_id.clone(),
                    yes_result: OrderResultSummary::from(yes_result),
                    no_result: OrderResultSummary::from(no_result),
                    at: now,
                });
                Ok(EngineOutcome::FillRejected)
            }
        }
    }

    async fn unwind_leg(
        &self,
        market: &Market,
        filled_side: Side,
        token_id: &str,
        fill_price: Decimal,
        fill_size: Decimal,
        fill_fee: Decimal,
        now: chrono::DateTime<Utc>,
    ) -> Result<EngineOutcome, CoreError> {
        self.unwind_on(&market.market_id, token_id, filled_side, fill_price, fill_size, fill_fee, self.exchange.as_ref(), now)
            .await
    }

    /// Shared unwind path: sells the filled leg back at a modest discount to
    /// its fill price on whichever exchange client filled it, accepting
    /// whatever the book gives. Generalized over the exchange client so
    /// cross-venue pairs can unwind on the venue that actually filled.
    async fn unwind_on(
        &self,
        market_id: &str,
        token_id: &str,
        filled_side: Side,
        fill_price: Decimal,
        fill_size: Decimal,
        fill_fee: Decimal,
        exchange: &dyn ExchangeClient,
        now: chrono::DateTime<Utc>,
    ) -> Result<EngineOutcome, CoreError> {
        let unwind_price = fill_price * dec!(0.98);
        let unwind_result = exchange
            .place_order(token_id, filled_side.opposite(), unwind_price, fill_size)
            .await?;

        let unwind_loss = match unwind_result {
            OrderResult::Filled { price, fee, .. } => fill_size * (fill_price - price) + fill_fee + fee,
            _ => fill_size * fill_price,
        };

        self.risk.record_trade(-unwind_loss, now);
        self.events.publish(ArbitrageEvent::PartialFillUnwound {
            market_id: market_id.to_string(),
            filled_side,
            unwind_loss,
            at: now,
        });
        Ok(EngineOutcome::PartialFillUnwound)
    }

    /// Cross-venue counterpart to `evaluate_and_execute`: the YES leg trades
    /// against `pair.market_a` on `yes_exchange`, the NO leg against
    /// `pair.market_b` on `no_exchange`, under one execution lock keyed on
    /// the pair rather than a single market id. Both markets' books must
    /// already be registered under their own market ids via `reset_book`
    /// (only the YES side of `market_a`'s book and the NO side of
    /// `market_b`'s book are read).
    pub async fn evaluate_and_execute_pair(
        &self,
        pair: &MarketPair,
        yes_exchange: Arc<dyn ExchangeClient>,
        no_exchange: Arc<dyn ExchangeClient>,
        quality_score: Decimal,
    ) -> Result<EngineOutcome, CoreError> {
        let lock_key = format!("{}::{}", pair.market_a.market_id, pair.market_b.market_id);
        let Some(_guard) = self.execution_lock.try_acquire(&lock_key) else {
            return Ok(EngineOutcome::Skipped(SkipReason::ExecutionLockHeld));
        };

        // 1. Detect.
        let Some(yes_asks) = self.read_one_side(&pair.market_a.market_id, true).await else {
            return Ok(EngineOutcome::Skipped(SkipReason::EmptyBook));
        };
        let Some(no_asks) = self.read_one_side(&pair.market_b.market_id, false).await else {
            return Ok(EngineOutcome::Skipped(SkipReason::EmptyBook));
        };

        // 2. Size search.
        let Some(sizing) = self.search_size(&yes_asks, &no_asks) else {
            return Ok(EngineOutcome::Skipped(SkipReason::NoProfitableSize));
        };

        // 3. Quality gates.
        if let Some(reason) = self.quality_gates(&lock_key, quality_score).await {
            return Ok(EngineOutcome::Skipped(reason));
        }

        // 4. Allocate. UnifiedMarket carries no volume figure, so the
        // opportunity's quality score is the caller-supplied score directly
        // rather than a scorer::score() recomputation.
        let gross_cost = sizing.shares * (sizing.yes_fill.effective_price + sizing.no_fill.effective_price);
        let fees = self.config.trading_fee_percent * gross_cost;
        let net_profit = sizing.shares - gross_cost - fees;
        let roi = if gross_cost > Decimal::ZERO { net_profit / gross_cost } else { Decimal::ZERO };
        let opportunity = crate::types::Opportunity {
            market_id: lock_key.clone(),
            yes_ask_levels: yes_asks.clone(),
            no_ask_levels: no_asks.clone(),
            shares: sizing.shares,
            gross_cost,
            fees,
            net_profit,
            roi,
            score: quality_score,
            observed_at: Utc::now(),
        };
        self.cache.insert(opportunity.clone());
        self.events.publish(ArbitrageEvent::OpportunityDetected {
            market_id: lock_key.clone(),
            net_edge: roi,
            shares: sizing.shares,
            observed_at: opportunity.observed_at,
        });

        let risk_state = self.risk.snapshot();
        let balance = yes_exchange.get_balance("USD").await.unwrap_or(self.config.fallback_balance);
        let depth_fraction = (sizing.shares / top_of_book_depth(&yes_asks, &no_asks)).min(Decimal::ONE);
        let alloc_dollars = allocator::allocate(
            &opportunity,
            &risk_state,
            Utc::now(),
            self.config.capital_per_trade,
            self.config.max_daily_loss,
            balance,
            depth_fraction,
            sizing.yes_fill.effective_price + sizing.no_fill.effective_price,
        );
        let final_shares = sizing
            .shares
            .min((alloc_dollars / (sizing.yes_fill.effective_price + sizing.no_fill.effective_price)).floor())
            .max(Decimal::ZERO);
        if final_shares <= Decimal::ZERO {
            return Ok(EngineOutcome::Skipped(SkipReason::InsufficientBalance));
        }

        // 5. Slippage recheck.
        let Some(yes_asks_fresh) = self.read_one_side(&pair.market_a.market_id, true).await else {
            return Ok(EngineOutcome::Skipped(SkipReason::EmptyBook));
        };
        let Some(no_asks_fresh) = self.read_one_side(&pair.market_b.market_id, false).await else {
            return Ok(EngineOutcome::Skipped(SkipReason::EmptyBook));
        };
        let yes_fill = impact::effective_price(&yes_asks_fresh, final_shares);
        let no_fill = impact::effective_price(&no_asks_fresh, final_shares);
        let (Some(yes_fill), Some(no_fill)) = (yes_fill, no_fill) else {
            self.events.publish(ArbitrageEvent::SlippageExceeded { market_id: lock_key.clone(), at: Utc::now() });
            return Err(CoreError::slippage(lock_key.clone(), "book depth vanished before execution"));
        };

        let moved = (yes_fill.effective_price - sizing.yes_fill.effective_price).abs() > self.config.max_slippage
            || (no_fill.effective_price - sizing.no_fill.effective_price).abs() > self.config.max_slippage;
        let fee_per_leg = self.config.trading_fee_percent;
        let total_cost = yes_fill.effective_price + no_fill.effective_price + fee_per_leg * (yes_fill.effective_price + no_fill.effective_price);
        if moved || total_cost > Decimal::ONE - self.config.min_profit_margin {
            self.cooldown.record(&lock_key, Utc::now());
            self.events.publish(ArbitrageEvent::SlippageExceeded { market_id: lock_key.clone(), at: Utc::now() });
            return Err(CoreError::slippage(lock_key.clone(), "effective price moved adversely past execution"));
        }

        let profit_per_share = Decimal::ONE - total_cost;
        if final_shares * profit_per_share < self.config.min_profit_dollars {
            return Ok(EngineOutcome::Skipped(SkipReason::BelowMinProfit));
        }

        // 6. Execute: one leg per venue.
        let yes_limit = round_up_tick(yes_fill.effective_price);
        let no_limit = round_up_tick(no_fill.effective_price);
        let order_fut = async {
            tokio::join!(
                yes_exchange.place_order(&pair.market_a.yes_token_id, Side::Yes, yes_limit, final_shares),
                no_exchange.place_order(&pair.market_b.no_token_id, Side::No, no_limit, final_shares),
            )
        };
        let (yes_result, no_result) = match tokio_timeout(std::time::Duration::from_secs(ORDER_TIMEOUT_SECS), order_fut).await {
            Ok((y, n)) => (y.unwrap_or(OrderResult::Timeout), n.unwrap_or(OrderResult::Timeout)),
            Err(_) => (OrderResult::Timeout, OrderResult::Timeout),
        };

        // 7. Reconcile.
        let now = Utc::now();
        self.cooldown.record(&lock_key, now);

        match (&yes_result, &no_result) {
            (OrderResult::Filled { price: yp, size: ys, fee: yf }, OrderResult::Filled { price: np, size: ns, fee: nf }) => {
                self.trade_sink
                    .record(Trade {
                        ts: now,
                        market_id: pair.market_a.market_id.clone(),
                        token_id: pair.market_a.yes_token_id.clone(),
                        side: Side::Yes,
                        price: *yp,
                        size: *ys,
                        fee: *yf,
                        exchange: pair.market_a.exchange,
                    })
                    .await?;
                self.trade_sink
                    .record(Trade {
                        ts: now,
                        market_id: pair.market_b.market_id.clone(),
                        token_id: pair.market_b.no_token_id.clone(),
                        side: Side::No,
                        price: *np,
                        size: *ns,
                        fee: *nf,
                        exchange: pair.market_b.exchange,
                    })
                    .await?;

                self.positions.open(Position::open(lock_key.clone(), final_shares, *yp, *np, now)).await;
                self.events.publish(ArbitrageEvent::PositionOpened {
                    market_id: lock_key.clone(),
                    shares: final_shares,
                    at: now,
                });

                let net_profit = final_shares - final_shares * (*yp + *np) - (*yf + *nf);
                self.risk.record_trade(net_profit, now);
                self.events.publish(ArbitrageEvent::TradeExecuted {
                    market_id: lock_key.clone(),
                    shares: final_shares,
                    realized_profit: net_profit,
                    executed_at: now,
                });

                Ok(EngineOutcome::BothFilled { shares: final_shares, net_profit })
            }
            (OrderResult::Filled { price, size, fee }, _) => {
                self.unwind_on(&lock_key, &pair.market_a.yes_token_id, Side::Yes, *price, *size, *fee, yes_exchange.as_ref(), now)
                    .await
            }
            (_, OrderResult::Filled { price, size, fee }) => {
                self.unwind_on(&lock_key, &pair.market_b.no_token_id, Side::No, *price, *size, *fee, no_exchange.as_ref(), now)
                    .await
            }
            _ => {
                self.events.publish(ArbitrageEvent::FillRejected {
                    market_id: lock_key.clone(),
                    yes_result: OrderResultSummary::from(&yes_result),
                    no_result: OrderResultSummary::from(&no_result),
                    at: now,
                });
                Ok(EngineOutcome::FillRejected)
            }
        }
    }
}

struct SizeResult {
    shares: Decimal,
    yes_fill: FillSimulation,
    no_fill: FillSimulation,
}

fn top_of_book_depth(yes_asks: &[(Decimal, Decimal)], no_asks: &[(Decimal, Decimal)]) -> Decimal {
    let yes_depth: Decimal = yes_asks.iter().map(|(_, size)| *size).sum();
    let no_depth: Decimal = no_asks.iter().map(|(_, size)| *size).sum();
    yes_depth.min(no_depth)
}

fn round_up_tick(price: Decimal) -> Decimal {
    (price / TICK).ceil() * TICK
}
