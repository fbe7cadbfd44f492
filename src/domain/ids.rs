use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_id {
    ($($(#[$meta:meta])* $name:ident),+ $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(
                Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
            )]
            #[serde(transparent)]
            pub struct $name(pub u64);

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }

            impl From<u64> for $name {
                fn from(value: u64) -> Self {
                    Self(value)
                }
            }
        )+
    };
}

define_id!(
    /// A listed product (template, agent or app).
    ProductId,
    /// The seller owning a product.
    SellerId,
    /// A verifier or panel expert.
    VerifierId,
    /// A platform administrator.
    AdminId,
    VerificationId,
    ExpertReviewId,
    SettlementId,
    PayoutBatchId,
    OrderId,
);
