use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Every knob enumerated in spec §6, with the literal defaults spec.md gives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbitrageConfig {
    pub capital_per_trade: Decimal,
    pub min_profit_margin: Decimal,
    pub min_market_volume: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub max_daily_loss: Decimal,
    pub max_tokens_monitor: usize,
    pub max_concurrent_positions: usize,
    pub max_order_book_depth: usize,
    pub min_market_quality_score: Decimal,
    #[serde(with = "humantime_secs")]
    pub cooldown: Duration,
    pub max_slippage: Decimal,
    pub trading_fee_percent: Decimal,
    pub min_profit_dollars: Decimal,
    pub fallback_balance: Decimal,
    pub enabled_platforms: Vec<String>,
    pub cross_platform_arbitrage: bool,
    pub min_match_similarity: f64,
}

impl Default for ArbitrageConfig {
    fn default() -> Self {
        Self {
            capital_per_trade: dec!(10),
            min_profit_margin: dec!(0.02),
            min_market_volume: dec!(5000),
            stop_loss: dec!(0.05),
            take_profit: dec!(0.10),
            max_daily_loss: dec!(50),
            max_tokens_monitor: 20,
            max_concurrent_positions: 10,
            max_order_book_depth: 20,
            min_market_quality_score: dec!(50),
            cooldown: Duration::from_secs(30),
            max_slippage: dec!(0.005),
            trading_fee_percent: dec!(0.01),
            min_profit_dollars: dec!(1.0),
            fallback_balance: dec!(1000),
            enabled_platforms: vec!["kalshi".to_string(), "polymarket".to_string()],
            cross_platform_arbitrage: true,
            min_match_similarity: 0.80,
        }
    }
}

impl ArbitrageConfig {
    /// Tighter limits: smaller size, bigger margin, shorter monitoring set.
    /// Recommended for initial live validation.
    #[must_use]
    pub fn conservative() -> Self {
        Self {
            capital_per_trade: dec!(5),
            min_profit_margin: dec!(0.03),
            max_daily_loss: dec!(20),
            max_concurrent_positions: 3,
            cooldown: Duration::from_secs(60),
            max_slippage: dec!(0.003),
            ..Self::default()
        }
    }

    /// Looser limits for a well-capitalized, low-latency deployment.
    #[must_use]
    pub fn aggressive() -> Self {
        Self {
            capital_per_trade: dec!(50),
            min_profit_margin: dec!(0.01),
            max_daily_loss: dec!(200),
            max_concurrent_positions: 25,
            cooldown: Duration::from_secs(10),
            max_slippage: dec!(0.01),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_capital_per_trade(mut self, capital: Decimal) -> Self {
        self.capital_per_trade = capital;
        self
    }

    #[must_use]
    pub fn with_max_daily_loss(mut self, max_loss: Decimal) -> Self {
        self.max_daily_loss = max_loss;
        self
    }

    #[must_use]
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }
}

/// Root application configuration: the arbitrage knobs plus whatever a
/// deployment needs around them. Loaded via [`crate::config_loader::ConfigLoader`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub arbitrage: ArbitrageConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            arbitrage: ArbitrageConfig::default(),
        }
    }
}

mod humantime_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_spec_literals() {
        let cfg = ArbitrageConfig::default();
        assert_eq!(cfg.capital_per_trade, dec!(10));
        assert_eq!(cfg.min_profit_margin, dec!(0.02));
        assert_eq!(cfg.min_market_volume, dec!(5000));
        assert_eq!(cfg.stop_loss, dec!(0.05));
        assert_eq!(cfg.take_profit, dec!(0.10));
        assert_eq!(cfg.max_daily_loss, dec!(50));
        assert_eq!(cfg.max_tokens_monitor, 20);
        assert_eq!(cfg.max_concurrent_positions, 10);
        assert_eq!(cfg.max_order_book_depth, 20);
        assert_eq!(cfg.min_market_quality_score, dec!(50));
        assert_eq!(cfg.cooldown, Duration::from_secs(30));
        assert_eq!(cfg.max_slippage, dec!(0.005));
        assert_eq!(cfg.trading_fee_percent, dec!(0.01));
        assert_eq!(cfg.min_profit_dollars, dec!(1.0));
        assert_eq!(cfg.fallback_balance, dec!(1000));
        assert!(cfg.cross_platform_arbitrage);
        assert_eq!(cfg.min_match_similarity, 0.80);
    }

    #[test]
    fn conservative_is_tighter_than_default() {
        let default = ArbitrageConfig::default();
        let conservative = ArbitrageConfig::conservative();
        assert!(conservative.capital_per_trade < default.capital_per_trade);
        assert!(conservative.max_daily_loss < default.max_daily_loss);
        assert!(conservative.cooldown > default.cooldown);
    }

    #[test]
    fn builder_overrides_apply() {
        let cfg = ArbitrageConfig::default()
            .with_capital_per_trade(dec!(25))
            .with_max_daily_loss(dec!(100));
        assert_eq!(cfg.capital_per_trade, dec!(25));
        assert_eq!(cfg.max_daily_loss, dec!(100));
    }
}
