//! Contracts for the remote ledger and RTP services.
//!
//! The gateway never owns money. Every balance it shows comes from a
//! ledger reply, and [`PlayerSession`](crate::PlayerSession) only mutates
//! its cached balance from one of the reply types below. Calls are keyed by
//! operator application (`app_id`), which real clients forward as call
//! metadata.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use parking_lot::Mutex;

use crate::LedgerError;

// ---------------------------------------------------------------------------
// Requests and replies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct BalanceRequest {
    pub player_id: String,
    pub currency: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BalanceReply {
    pub balance: f64,
}

/// Shared shape of bet, win and refund requests.
#[derive(Debug, Clone, PartialEq)]
pub struct SettleRequest {
    pub player_id: String,
    pub currency: String,
    pub game_id: String,
    pub round_id: String,
    pub amount: f64,
}

pub type BetRequest = SettleRequest;
pub type WinRequest = SettleRequest;
pub type RefundRequest = SettleRequest;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BetReply {
    pub balance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WinReply {
    pub balance: f64,
    /// `false` when the ledger did not recompute the balance; `balance` is
    /// then meaningless.
    pub has_balance_change: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefundReply {
    pub balance: f64,
}

/// The combined bet/win/refund call.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRequest {
    /// Must be `bet`, `win` or `refund`; checked before the call.
    pub transaction_type: String,
    pub settle: SettleRequest,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransactionReply {
    pub balance: f64,
    pub has_balance_change: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionType {
    Bet,
    Win,
    Refund,
}

impl FromStr for TransactionType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bet" => Ok(TransactionType::Bet),
            "win" => Ok(TransactionType::Win),
            "refund" => Ok(TransactionType::Refund),
            other => Err(LedgerError::InvalidTransactionType(other.to_owned())),
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransactionType::Bet => "bet",
            TransactionType::Win => "win",
            TransactionType::Refund => "refund",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RtpRequest {
    pub player_id: String,
    pub app_id: String,
    pub game_brand: String,
    pub game_id: String,
}

// ---------------------------------------------------------------------------
// Service traits
// ---------------------------------------------------------------------------

/// Authoritative balance and settlement service.
#[async_trait::async_trait]
pub trait Ledger: Send + Sync + 'static {
    async fn balance(&self, app_id: &str, req: BalanceRequest) -> Result<BalanceReply, LedgerError>;

    async fn bet(&self, app_id: &str, req: BetRequest) -> Result<BetReply, LedgerError>;

    async fn win(&self, app_id: &str, req: WinRequest) -> Result<WinReply, LedgerError>;

    async fn refund(&self, app_id: &str, req: RefundRequest) -> Result<RefundReply, LedgerError>;

    /// Performs an already-validated transaction. Call
    /// [`transaction`](Self::transaction) instead.
    async fn submit_transaction(
        &self,
        app_id: &str,
        kind: TransactionType,
        req: SettleRequest,
    ) -> Result<TransactionReply, LedgerError>;

    /// Validates `transaction_type` locally, then submits.
    async fn transaction(
        &self,
        app_id: &str,
        req: TransactionRequest,
    ) -> Result<TransactionReply, LedgerError> {
        let kind: TransactionType = req.transaction_type.parse()?;
        self.submit_transaction(app_id, kind, req.settle).await
    }
}

/// Source of a player's RTP tier.
#[async_trait::async_trait]
pub trait RtpService: Send + Sync + 'static {
    async fn player_rtp(&self, req: RtpRequest) -> Result<String, LedgerError>;
}

// ---------------------------------------------------------------------------
// In-memory implementations
// ---------------------------------------------------------------------------

/// A process-local ledger: every player starts at `initial_balance`.
pub struct InMemoryLedger {
    initial_balance: f64,
    balances: Mutex<HashMap<String, f64>>,
}

impl InMemoryLedger {
    pub fn new(initial_balance: f64) -> Self {
        Self {
            initial_balance,
            balances: Mutex::new(HashMap::new()),
        }
    }

    fn apply(&self, app_id: &str, player_id: &str, delta: f64) -> Result<f64, LedgerError> {
        let mut balances = self.balances.lock();
        let balance = balances
            .entry(format!("{app_id}-{player_id}"))
            .or_insert(self.initial_balance);
        if *balance + delta < 0.0 {
            return Err(LedgerError::Rejected("insufficient balance".into()));
        }
        *balance += delta;
        Ok(*balance)
    }
}

#[async_trait::async_trait]
impl Ledger for InMemoryLedger {
    async fn balance(&self, app_id: &str, req: BalanceRequest) -> Result<BalanceReply, LedgerError> {
        let balance = self.apply(app_id, &req.player_id, 0.0)?;
        Ok(BalanceReply { balance })
    }

    async fn bet(&self, app_id: &str, req: BetRequest) -> Result<BetReply, LedgerError> {
        let balance = self.apply(app_id, &req.player_id, -req.amount)?;
        Ok(BetReply { balance })
    }

    async fn win(&self, app_id: &str, req: WinRequest) -> Result<WinReply, LedgerError> {
        if req.amount == 0.0 {
            return Ok(WinReply {
                balance: 0.0,
                has_balance_change: false,
            });
        }
        let balance = self.apply(app_id, &req.player_id, req.amount)?;
        Ok(WinReply {
            balance,
            has_balance_change: true,
        })
    }

    async fn refund(&self, app_id: &str, req: RefundRequest) -> Result<RefundReply, LedgerError> {
        let balance = self.apply(app_id, &req.player_id, req.amount)?;
        Ok(RefundReply { balance })
    }

    async fn submit_transaction(
        &self,
        app_id: &str,
        kind: TransactionType,
        req: SettleRequest,
    ) -> Result<TransactionReply, LedgerError> {
        let delta = match kind {
            TransactionType::Bet => -req.amount,
            TransactionType::Win | TransactionType::Refund => req.amount,
        };
        let balance = self.apply(app_id, &req.player_id, delta)?;
        Ok(TransactionReply {
            balance,
            has_balance_change: delta != 0.0,
        })
    }
}

/// Answers every RTP query with the same tier.
pub struct FixedRtp(pub String);

#[async_trait::async_trait]
impl RtpService for FixedRtp {
    async fn player_rtp(&self, _req: RtpRequest) -> Result<String, LedgerError> {
        Ok(self.0.clone())
    }
}
