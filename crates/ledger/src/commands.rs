//! Normalized commands issued by external collaborators.
//!
//! Commands carry natural keys (item/warehouse codes) the way imports and
//! order flows produce them; the service layer resolves them to ids before
//! touching the store.

use serde::{Deserialize, Serialize};

use kardex_core::{LedgerError, LedgerResult, UserId};

use crate::entry::{DocumentRef, TransactionType};

/// Command: add stock to one (warehouse, item) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncrementStock {
    pub warehouse_code: String,
    pub item_code: String,
    /// Descriptive fields used only when the item is created on first use.
    pub item_name: Option<String>,
    pub category: Option<String>,
    pub unit: Option<String>,
    pub quantity: i64,
    pub tx_type: TransactionType,
    pub document: Option<DocumentRef>,
    pub division: Option<String>,
    pub note: Option<String>,
    pub user_id: Option<UserId>,
}

impl IncrementStock {
    pub fn validate(&self) -> LedgerResult<()> {
        require_code("warehouse_code", &self.warehouse_code)?;
        require_code("item_code", &self.item_code)?;
        if self.quantity < 0 {
            return Err(LedgerError::validation(format!(
                "increment quantity must not be negative, got {}",
                self.quantity
            )));
        }
        Ok(())
    }
}

/// Command: remove stock for an item, FIFO across all its warehouses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecrementStock {
    pub item_code: String,
    pub quantity: i64,
    pub tx_type: TransactionType,
    pub document: Option<DocumentRef>,
    pub note: Option<String>,
    pub user_id: Option<UserId>,
}

impl DecrementStock {
    pub fn validate(&self) -> LedgerResult<()> {
        require_code("item_code", &self.item_code)?;
        if self.quantity <= 0 {
            return Err(LedgerError::validation(format!(
                "decrement quantity must be positive, got {}",
                self.quantity
            )));
        }
        Ok(())
    }
}

/// Command: set an item's quantity to a target value.
///
/// With a warehouse code the target applies to that warehouse's lot; without
/// one it applies to the item's aggregate total (the warehouse-agnostic
/// path). The delta is computed and applied as an `Adjustment` movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustStock {
    pub item_code: String,
    pub new_quantity: i64,
    pub warehouse_code: Option<String>,
    pub note: Option<String>,
    pub user_id: Option<UserId>,
}

impl AdjustStock {
    pub fn validate(&self) -> LedgerResult<()> {
        require_code("item_code", &self.item_code)?;
        if let Some(code) = &self.warehouse_code {
            require_code("warehouse_code", code)?;
        }
        if self.new_quantity < 0 {
            return Err(LedgerError::validation(format!(
                "adjusted quantity must not be negative, got {}",
                self.new_quantity
            )));
        }
        Ok(())
    }
}

/// Union of the ledger's command surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerCommand {
    Increment(IncrementStock),
    Decrement(DecrementStock),
    Adjust(AdjustStock),
}

impl LedgerCommand {
    pub fn validate(&self) -> LedgerResult<()> {
        match self {
            LedgerCommand::Increment(cmd) => cmd.validate(),
            LedgerCommand::Decrement(cmd) => cmd.validate(),
            LedgerCommand::Adjust(cmd) => cmd.validate(),
        }
    }

    /// Item code the command targets (for per-row failure reporting).
    pub fn item_code(&self) -> &str {
        match self {
            LedgerCommand::Increment(cmd) => &cmd.item_code,
            LedgerCommand::Decrement(cmd) => &cmd.item_code,
            LedgerCommand::Adjust(cmd) => &cmd.item_code,
        }
    }
}

fn require_code(field: &str, value: &str) -> LedgerResult<()> {
    if value.trim().is_empty() {
        return Err(LedgerError::validation(format!("{field} must not be empty")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn increment(quantity: i64) -> IncrementStock {
        IncrementStock {
            warehouse_code: "WH-01".to_string(),
            item_code: "ITM-001".to_string(),
            item_name: None,
            category: None,
            unit: None,
            quantity,
            tx_type: TransactionType::Purchase,
            document: None,
            division: None,
            note: None,
            user_id: None,
        }
    }

    #[test]
    fn increment_accepts_zero_but_not_negative() {
        assert!(increment(0).validate().is_ok());
        assert!(increment(10).validate().is_ok());
        assert!(matches!(
            increment(-1).validate(),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn blank_codes_are_rejected() {
        let mut cmd = increment(5);
        cmd.item_code = "  ".to_string();
        assert!(matches!(cmd.validate(), Err(LedgerError::Validation(_))));

        let cmd = DecrementStock {
            item_code: String::new(),
            quantity: 5,
            tx_type: TransactionType::Sale,
            document: None,
            note: None,
            user_id: None,
        };
        assert!(matches!(cmd.validate(), Err(LedgerError::Validation(_))));
    }

    #[test]
    fn decrement_requires_positive_quantity() {
        let cmd = DecrementStock {
            item_code: "ITM-001".to_string(),
            quantity: 0,
            tx_type: TransactionType::Usage,
            document: None,
            note: None,
            user_id: None,
        };
        assert!(matches!(cmd.validate(), Err(LedgerError::Validation(_))));
    }

    #[test]
    fn adjust_rejects_negative_target() {
        let cmd = AdjustStock {
            item_code: "ITM-001".to_string(),
            new_quantity: -3,
            warehouse_code: None,
            note: None,
            user_id: None,
        };
        assert!(matches!(cmd.validate(), Err(LedgerError::Validation(_))));
    }
}
