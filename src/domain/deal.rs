use crate::error::DealflowError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A positive amount requested in a deal.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, DealflowError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(DealflowError::Validation(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = DealflowError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl FromStr for Amount {
    type Err = DealflowError;

    /// Parses user input; a comma is accepted as the decimal separator.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace(',', ".");
        let value = Decimal::from_str(&normalized)
            .map_err(|e| DealflowError::Validation(format!("not a number: {e}")))?;
        Self::new(value)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "snake_case")]
pub enum DealState {
    #[default]
    Created,
    MethodSelected,
    AmountSet,
    Submitted,
    Accepted,
    Closed,
    Expired,
}

impl DealState {
    /// `true` while the client may still edit the deal.
    pub fn is_editable(&self) -> bool {
        matches!(self, Self::Created | Self::MethodSelected | Self::AmountSet)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::MethodSelected => "method selected",
            Self::AmountSet => "amount set",
            Self::Submitted => "under review",
            Self::Accepted => "accepted",
            Self::Closed => "closed",
            Self::Expired => "expired",
        }
    }
}

/// A currency-exchange request from a client, mediated by a trader.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Deal {
    pub id: i64,
    pub client_id: i64,
    /// Chat where the client's summary lives.
    pub chat_id: i64,
    #[serde(default)]
    pub trader_id: Option<i64>,
    #[serde(default)]
    pub state: DealState,
    #[serde(default)]
    pub method_name: Option<String>,
    #[serde(default)]
    pub amount: Option<Amount>,
    /// Epoch milliseconds.
    pub created_at: i64,
    #[serde(default)]
    pub submitted_at: Option<i64>,
    #[serde(default)]
    pub closed_at: Option<i64>,
    /// Client-side messages showing this deal's summary.
    #[serde(default)]
    pub client_messages: Vec<i64>,
}

impl Deal {
    pub fn new(id: i64, client_id: i64, chat_id: i64, created_at: i64) -> Self {
        Self {
            id,
            client_id,
            chat_id,
            trader_id: None,
            state: DealState::Created,
            method_name: None,
            amount: None,
            created_at,
            submitted_at: None,
            closed_at: None,
            client_messages: Vec::new(),
        }
    }

    /// Re-derives the pre-submission state from what has been filled in.
    pub fn refresh_draft_state(&mut self) {
        if !self.state.is_editable() {
            return;
        }
        self.state = match (&self.method_name, &self.amount) {
            (_, Some(_)) => DealState::AmountSet,
            (Some(_), None) => DealState::MethodSelected,
            (None, None) => DealState::Created,
        };
    }

    /// Reason the deal cannot be submitted yet, if any.
    pub fn missing_for_submit(&self) -> Option<&'static str> {
        if self.amount.is_none() {
            Some("No amount")
        } else if self.method_name.is_none() {
            Some("No payment method")
        } else {
            None
        }
    }
}
