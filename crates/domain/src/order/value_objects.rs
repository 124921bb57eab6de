//! Value objects for the order domain.

use serde::{Deserialize, Serialize};

/// The financial intent an order represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    /// Linked bank account to wallet.
    CashIn,
    /// Wallet to linked bank account.
    CashOut,
    /// Card purchase through the card provider.
    CardPurchase,
    /// Bill payment through the bill provider.
    BillPayment,
    /// Wallet to an account at another bank.
    InterBankTransfer,
    /// Incoming credit on a virtual account.
    VirtualAccountCredit,
    /// Refund of a previous order.
    Refund,
}

impl OrderType {
    /// Returns the type name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::CashIn => "CASH_IN",
            OrderType::CashOut => "CASH_OUT",
            OrderType::CardPurchase => "CARD_PURCHASE",
            OrderType::BillPayment => "BILL_PAYMENT",
            OrderType::InterBankTransfer => "INTER_BANK_TRANSFER",
            OrderType::VirtualAccountCredit => "VIRTUAL_ACCOUNT_CREDIT",
            OrderType::Refund => "REFUND",
        }
    }
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where the money for an order comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceOfFund {
    /// The user's wallet balance.
    #[default]
    Wallet,
    /// A bank account linked to the wallet.
    LinkedBank,
    /// A virtual account issued by a partner bank.
    VirtualAccount,
}

/// Code of an external provider (bank gateway, card or bill provider).
///
/// Provider codes come from configuration, so they are kept as
/// normalized upper-case strings rather than a closed enum.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderCode(String);

impl ProviderCode {
    /// Creates a provider code, normalizing it to trimmed upper case.
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_ascii_uppercase())
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProviderCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProviderCode {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl AsRef<str> for ProviderCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_code_is_normalized() {
        assert_eq!(ProviderCode::new(" bidv ").as_str(), "BIDV");
        assert_eq!(ProviderCode::from("Vcb"), ProviderCode::new("VCB"));
    }

    #[test]
    fn test_order_type_serialization() {
        let json = serde_json::to_string(&OrderType::InterBankTransfer).unwrap();
        assert_eq!(json, "\"INTER_BANK_TRANSFER\"");
        assert_eq!(OrderType::CashIn.to_string(), "CASH_IN");
    }

    #[test]
    fn test_default_source_of_fund_is_wallet() {
        assert_eq!(SourceOfFund::default(), SourceOfFund::Wallet);
    }
}
