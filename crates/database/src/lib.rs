pub mod error;

use std::str::FromStr;

use app_config::DatabaseSettings;
use chrono::{DateTime, Utc};
use core_types::{OrderSide, OrderType, Position, Side, Symbol, Trade, TradeStatus};
use rust_decimal::Decimal;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use tracing::info;

pub use error::{Error, Result};

// SQLite has no decimal type, so monetary columns are stored as TEXT and
// parsed back into Decimal. Aggregation happens in Rust for the same reason.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS positions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        exchange TEXT NOT NULL,
        symbol TEXT NOT NULL,
        side TEXT NOT NULL,
        amount TEXT NOT NULL,
        entry_price TEXT NOT NULL,
        current_price TEXT NOT NULL,
        leverage TEXT NOT NULL,
        stop_loss TEXT,
        take_profit TEXT,
        trailing_stop TEXT,
        unrealized_pnl TEXT NOT NULL,
        unrealized_pnl_pct TEXT NOT NULL,
        strategy_name TEXT NOT NULL,
        is_open INTEGER NOT NULL,
        is_paper_trade INTEGER NOT NULL,
        opened_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        closed_at TEXT,
        entry_trade_id INTEGER,
        exit_trade_id INTEGER
    )",
    // One open position per (exchange, symbol) is enforced here, not in
    // application code.
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_positions_open_key
        ON positions (exchange, symbol) WHERE is_open = 1",
    "CREATE TABLE IF NOT EXISTS trades (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        exchange TEXT NOT NULL,
        symbol TEXT NOT NULL,
        order_id TEXT NOT NULL UNIQUE,
        side TEXT NOT NULL,
        order_type TEXT NOT NULL,
        amount TEXT NOT NULL,
        price TEXT NOT NULL,
        cost TEXT NOT NULL,
        fee TEXT NOT NULL,
        fee_currency TEXT,
        position_side TEXT NOT NULL,
        strategy_name TEXT NOT NULL,
        status TEXT NOT NULL,
        is_paper_trade INTEGER NOT NULL,
        realized_pnl TEXT NOT NULL,
        created_at TEXT NOT NULL,
        executed_at TEXT,
        closed_at TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_trades_status ON trades (status)",
];

/// Handle to the bot's SQLite storage. Cheap to clone.
#[derive(Clone)]
pub struct Db {
    pool: SqlitePool,
}

/// Opens (creating if missing) the database and ensures the schema exists.
pub async fn connect(settings: &DatabaseSettings) -> Result<Db> {
    let options = SqliteConnectOptions::from_str(&settings.url)?.create_if_missing(true);

    // A single connection keeps SQLite's writer model simple and makes
    // `sqlite::memory:` behave as one database in tests.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    let db = Db { pool };
    db.ensure_schema().await?;
    info!(url = %settings.url, "database ready");
    Ok(db)
}

impl Db {
    async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(Error::OperationFailed)?;
        }
        Ok(())
    }

    /// Inserts a position and returns its assigned id.
    pub async fn insert_position(&self, position: &Position) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO positions (
                exchange, symbol, side, amount, entry_price, current_price,
                leverage, stop_loss, take_profit, trailing_stop,
                unrealized_pnl, unrealized_pnl_pct, strategy_name,
                is_open, is_paper_trade, opened_at, updated_at, closed_at,
                entry_trade_id, exit_trade_id
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&position.exchange)
        .bind(&position.symbol.0)
        .bind(position.side.as_str())
        .bind(position.amount.to_string())
        .bind(position.entry_price.to_string())
        .bind(position.current_price.to_string())
        .bind(position.leverage.to_string())
        .bind(position.stop_loss.map(|d| d.to_string()))
        .bind(position.take_profit.map(|d| d.to_string()))
        .bind(position.trailing_stop.map(|d| d.to_string()))
        .bind(position.unrealized_pnl.to_string())
        .bind(position.unrealized_pnl_pct.to_string())
        .bind(&position.strategy_name)
        .bind(position.is_open)
        .bind(position.is_paper_trade)
        .bind(position.opened_at)
        .bind(position.updated_at)
        .bind(position.closed_at)
        .bind(position.entry_trade_id)
        .bind(position.exit_trade_id)
        .execute(&self.pool)
        .await
        .map_err(Error::OperationFailed)?;

        Ok(result.last_insert_rowid())
    }

    pub async fn update_position(&self, position: &Position) -> Result<()> {
        sqlx::query(
            "UPDATE positions SET
                current_price = ?, unrealized_pnl = ?, unrealized_pnl_pct = ?,
                stop_loss = ?, take_profit = ?, trailing_stop = ?,
                is_open = ?, updated_at = ?, closed_at = ?, exit_trade_id = ?
             WHERE id = ?",
        )
        .bind(position.current_price.to_string())
        .bind(position.unrealized_pnl.to_string())
        .bind(position.unrealized_pnl_pct.to_string())
        .bind(position.stop_loss.map(|d| d.to_string()))
        .bind(position.take_profit.map(|d| d.to_string()))
        .bind(position.trailing_stop.map(|d| d.to_string()))
        .bind(position.is_open)
        .bind(position.updated_at)
        .bind(position.closed_at)
        .bind(position.exit_trade_id)
        .bind(position.id)
        .execute(&self.pool)
        .await
        .map_err(Error::OperationFailed)?;
        Ok(())
    }

    pub async fn get_open_positions(&self) -> Result<Vec<Position>> {
        let rows = sqlx::query("SELECT * FROM positions WHERE is_open = 1")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::OperationFailed)?;

        rows.iter().map(position_from_row).collect()
    }

    pub async fn get_position(&self, id: i64) -> Result<Option<Position>> {
        let row = sqlx::query("SELECT * FROM positions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::OperationFailed)?;

        row.as_ref().map(position_from_row).transpose()
    }

    /// Inserts a trade and returns its assigned id.
    pub async fn insert_trade(&self, trade: &Trade) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO trades (
                exchange, symbol, order_id, side, order_type, amount, price,
                cost, fee, fee_currency, position_side, strategy_name, status,
                is_paper_trade, realized_pnl, created_at, executed_at, closed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&trade.exchange)
        .bind(&trade.symbol.0)
        .bind(&trade.order_id)
        .bind(trade.side.as_str())
        .bind(trade.order_type.as_str())
        .bind(trade.amount.to_string())
        .bind(trade.price.to_string())
        .bind(trade.cost.to_string())
        .bind(trade.fee.to_string())
        .bind(&trade.fee_currency)
        .bind(trade.position_side.as_str())
        .bind(&trade.strategy_name)
        .bind(trade.status.as_str())
        .bind(trade.is_paper_trade)
        .bind(trade.realized_pnl.to_string())
        .bind(trade.created_at)
        .bind(trade.executed_at)
        .bind(trade.closed_at)
        .execute(&self.pool)
        .await
        .map_err(Error::OperationFailed)?;

        Ok(result.last_insert_rowid())
    }

    /// Stamps a trade as closed with its realized P&L.
    pub async fn mark_trade_closed(
        &self,
        id: i64,
        realized_pnl: Decimal,
        closed_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query("UPDATE trades SET status = 'closed', realized_pnl = ?, closed_at = ? WHERE id = ?")
            .bind(realized_pnl.to_string())
            .bind(closed_at)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::OperationFailed)?;
        Ok(())
    }

    pub async fn get_trade(&self, id: i64) -> Result<Option<Trade>> {
        let row = sqlx::query("SELECT * FROM trades WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::OperationFailed)?;

        row.as_ref().map(trade_from_row).transpose()
    }

    /// Total realized P&L across all closed trades.
    pub async fn sum_realized_pnl(&self) -> Result<Decimal> {
        let rows = sqlx::query("SELECT realized_pnl FROM trades WHERE status = 'closed'")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::OperationFailed)?;

        sum_decimal_rows(&rows, "realized_pnl")
    }

    /// Realized P&L of trades closed at or after `since`.
    pub async fn realized_pnl_since(&self, since: DateTime<Utc>) -> Result<Decimal> {
        let rows = sqlx::query(
            "SELECT realized_pnl FROM trades WHERE status = 'closed' AND closed_at >= ?",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::OperationFailed)?;

        sum_decimal_rows(&rows, "realized_pnl")
    }

    pub async fn count_closed_trades(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM trades WHERE status = 'closed'")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::OperationFailed)?;
        row.try_get("n").map_err(Error::OperationFailed)
    }
}

fn sum_decimal_rows(rows: &[SqliteRow], column: &'static str) -> Result<Decimal> {
    let mut total = Decimal::ZERO;
    for row in rows {
        total += decimal_col(row, column)?;
    }
    Ok(total)
}

fn decimal_col(row: &SqliteRow, column: &'static str) -> Result<Decimal> {
    let raw: String = row.try_get(column).map_err(Error::OperationFailed)?;
    Decimal::from_str(&raw).map_err(|_| Error::Decode { column, value: raw })
}

fn opt_decimal_col(row: &SqliteRow, column: &'static str) -> Result<Option<Decimal>> {
    let raw: Option<String> = row.try_get(column).map_err(Error::OperationFailed)?;
    match raw {
        Some(raw) => Decimal::from_str(&raw)
            .map(Some)
            .map_err(|_| Error::Decode { column, value: raw }),
        None => Ok(None),
    }
}

fn variant_col<T: FromStr>(row: &SqliteRow, column: &'static str) -> Result<T> {
    let raw: String = row.try_get(column).map_err(Error::OperationFailed)?;
    raw.parse()
        .map_err(|_| Error::Decode { column, value: raw })
}

fn position_from_row(row: &SqliteRow) -> Result<Position> {
    Ok(Position {
        id: row.try_get("id").map_err(Error::OperationFailed)?,
        exchange: row.try_get("exchange").map_err(Error::OperationFailed)?,
        symbol: Symbol(row.try_get("symbol").map_err(Error::OperationFailed)?),
        side: variant_col::<Side>(row, "side")?,
        amount: decimal_col(row, "amount")?,
        entry_price: decimal_col(row, "entry_price")?,
        current_price: decimal_col(row, "current_price")?,
        leverage: decimal_col(row, "leverage")?,
        stop_loss: opt_decimal_col(row, "stop_loss")?,
        take_profit: opt_decimal_col(row, "take_profit")?,
        trailing_stop: opt_decimal_col(row, "trailing_stop")?,
        unrealized_pnl: decimal_col(row, "unrealized_pnl")?,
        unrealized_pnl_pct: decimal_col(row, "unrealized_pnl_pct")?,
        strategy_name: row
            .try_get("strategy_name")
            .map_err(Error::OperationFailed)?,
        is_open: row.try_get("is_open").map_err(Error::OperationFailed)?,
        is_paper_trade: row
            .try_get("is_paper_trade")
            .map_err(Error::OperationFailed)?,
        opened_at: row.try_get("opened_at").map_err(Error::OperationFailed)?,
        updated_at: row.try_get("updated_at").map_err(Error::OperationFailed)?,
        closed_at: row.try_get("closed_at").map_err(Error::OperationFailed)?,
        entry_trade_id: row
            .try_get("entry_trade_id")
            .map_err(Error::OperationFailed)?,
        exit_trade_id: row
            .try_get("exit_trade_id")
            .map_err(Error::OperationFailed)?,
    })
}

fn trade_from_row(row: &SqliteRow) -> Result<Trade> {
    Ok(Trade {
        id: row.try_get("id").map_err(Error::OperationFailed)?,
        exchange: row.try_get("exchange").map_err(Error::OperationFailed)?,
        symbol: Symbol(row.try_get("symbol").map_err(Error::OperationFailed)?),
        order_id: row.try_get("order_id").map_err(Error::OperationFailed)?,
        side: variant_col::<OrderSide>(row, "side")?,
        order_type: variant_col::<OrderType>(row, "order_type")?,
        amount: decimal_col(row, "amount")?,
        price: decimal_col(row, "price")?,
        cost: decimal_col(row, "cost")?,
        fee: decimal_col(row, "fee")?,
        fee_currency: row
            .try_get("fee_currency")
            .map_err(Error::OperationFailed)?,
        position_side: variant_col::<Side>(row, "position_side")?,
        strategy_name: row
            .try_get("strategy_name")
            .map_err(Error::OperationFailed)?,
        status: variant_col::<TradeStatus>(row, "status")?,
        is_paper_trade: row
            .try_get("is_paper_trade")
            .map_err(Error::OperationFailed)?,
        realized_pnl: decimal_col(row, "realized_pnl")?,
        created_at: row.try_get("created_at").map_err(Error::OperationFailed)?,
        executed_at: row.try_get("executed_at").map_err(Error::OperationFailed)?,
        closed_at: row.try_get("closed_at").map_err(Error::OperationFailed)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    async fn memory_db() -> Db {
        let settings = DatabaseSettings {
            url: "sqlite::memory:".to_string(),
        };
        connect(&settings).await.unwrap()
    }

    fn sample_position() -> Position {
        let now = Utc::now();
        Position {
            id: 0,
            exchange: "binance".to_string(),
            symbol: Symbol("BTC/USDT".to_string()),
            side: Side::Long,
            amount: dec!(0.5),
            entry_price: dec!(50000),
            current_price: dec!(50000),
            leverage: Decimal::ONE,
            stop_loss: Some(dec!(49000)),
            take_profit: Some(dec!(52000)),
            trailing_stop: None,
            unrealized_pnl: Decimal::ZERO,
            unrealized_pnl_pct: Decimal::ZERO,
            strategy_name: "ma_crossover".to_string(),
            is_open: true,
            is_paper_trade: true,
            opened_at: now,
            updated_at: now,
            closed_at: None,
            entry_trade_id: None,
            exit_trade_id: None,
        }
    }

    fn sample_trade(order_id: &str) -> Trade {
        let now = Utc::now();
        Trade {
            id: 0,
            exchange: "binance".to_string(),
            symbol: Symbol("BTC/USDT".to_string()),
            order_id: order_id.to_string(),
            side: OrderSide::Buy,
            order_type: OrderType::Market,
            amount: dec!(0.5),
            price: dec!(50000),
            cost: dec!(25000),
            fee: dec!(25),
            fee_currency: Some("USDT".to_string()),
            position_side: Side::Long,
            strategy_name: "ma_crossover".to_string(),
            status: TradeStatus::Open,
            is_paper_trade: true,
            realized_pnl: Decimal::ZERO,
            created_at: now,
            executed_at: Some(now),
            closed_at: None,
        }
    }

    #[tokio::test]
    async fn position_roundtrip_preserves_decimals() {
        let db = memory_db().await;
        let id = db.insert_position(&sample_position()).await.unwrap();

        let loaded = db.get_position(id).await.unwrap().unwrap();
        assert_eq!(loaded.amount, dec!(0.5));
        assert_eq!(loaded.entry_price, dec!(50000));
        assert_eq!(loaded.stop_loss, Some(dec!(49000)));
        assert_eq!(loaded.side, Side::Long);
        assert!(loaded.is_open);
    }

    #[tokio::test]
    async fn only_one_open_position_per_symbol() {
        let db = memory_db().await;
        db.insert_position(&sample_position()).await.unwrap();
        let err = db.insert_position(&sample_position()).await;
        assert!(err.is_err());

        // A closed position does not conflict.
        let mut closed = sample_position();
        closed.is_open = false;
        db.insert_position(&closed).await.unwrap();
    }

    #[tokio::test]
    async fn closing_a_position_frees_the_slot() {
        let db = memory_db().await;
        let id = db.insert_position(&sample_position()).await.unwrap();

        let mut position = db.get_position(id).await.unwrap().unwrap();
        position.is_open = false;
        position.closed_at = Some(Utc::now());
        db.update_position(&position).await.unwrap();

        assert!(db.get_open_positions().await.unwrap().is_empty());
        db.insert_position(&sample_position()).await.unwrap();
    }

    #[tokio::test]
    async fn trade_close_stamps_pnl_and_status() {
        let db = memory_db().await;
        let id = db.insert_trade(&sample_trade("t-1")).await.unwrap();

        db.mark_trade_closed(id, dec!(12.5), Utc::now())
            .await
            .unwrap();

        let trade = db.get_trade(id).await.unwrap().unwrap();
        assert_eq!(trade.status, TradeStatus::Closed);
        assert_eq!(trade.realized_pnl, dec!(12.5));
        assert!(trade.closed_at.is_some());
    }

    #[tokio::test]
    async fn realized_pnl_sums_exactly() {
        let db = memory_db().await;
        let a = db.insert_trade(&sample_trade("t-1")).await.unwrap();
        let b = db.insert_trade(&sample_trade("t-2")).await.unwrap();
        db.insert_trade(&sample_trade("t-3")).await.unwrap();

        db.mark_trade_closed(a, dec!(0.1), Utc::now()).await.unwrap();
        db.mark_trade_closed(b, dec!(0.2), Utc::now()).await.unwrap();

        assert_eq!(db.sum_realized_pnl().await.unwrap(), dec!(0.3));
        assert_eq!(db.count_closed_trades().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn duplicate_order_id_rejected() {
        let db = memory_db().await;
        db.insert_trade(&sample_trade("t-1")).await.unwrap();
        assert!(db.insert_trade(&sample_trade("t-1")).await.is_err());
    }
}
