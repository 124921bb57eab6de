//! Collaborator contracts and in-memory adapters.
//!
//! Network transports and persistence live outside this crate; flows and
//! reconciliation only see these traits.

pub mod bank;
pub mod ledger;
pub mod notifier;
pub mod order_store;
pub mod promotion;
pub mod provider;
pub mod virtual_account;

pub use bank::{BankGateway, BankOperation, BankRequest, InMemoryBankGateway};
pub use ledger::{InMemoryLedgerService, LedgerService};
pub use notifier::{InMemoryNotifier, Notification, NotificationKind, Notifier};
pub use order_store::{InMemoryOrderStore, OrderStore};
pub use promotion::{Discount, InMemoryPromotionService, PromotionService};
pub use provider::{Classified, ProviderResponse};
pub use virtual_account::{
    InMemoryVirtualAccountGateway, VaProvider, VaRequest, VaResponse, VaStatus, VirtualAccount,
    VirtualAccountGateway, VirtualAccountRegistry, VirtualAccountService,
};
