//! The error-kind taxonomy the core raises and how each kind is surfaced.
//!
//! A `BrokerError` is never swallowed: the handler boundary (FIX acceptor or
//! admin HTTP layer) matches on the variant to decide between a wire-level
//! rejection, an `OrderCancelReject`, or a plain admin error response.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    /// Bad `BeginString`, unparseable `BodyLength`, or checksum mismatch. Fatal to the session.
    #[error("FIX framing error: {0}")]
    WireFraming(String),

    /// Missing or ill-typed required tag on an inbound application message.
    #[error("FIX schema error: {0}")]
    WireSchema(String),

    /// `ClOrdID` collides with an already-accepted order.
    #[error("duplicate ClOrdID: {0}")]
    DuplicateClOrdId(String),

    /// Stop or stop-limit `OrdType` received; the lifecycle engine has no semantics for it.
    #[error("unsupported order type")]
    UnsupportedOrderType,

    /// An administrative action was attempted from a state that does not admit it.
    #[error("illegal transition: {0}")]
    IllegalTransition(String),

    /// A limit order's price does not cross the symbol's current reference price.
    #[error("limit price not crossed")]
    LimitNotCrossed,

    /// Symbol absent from the registry; fills cannot be priced.
    #[error("symbol not in universe: {0}")]
    SymbolUnknown(String),

    /// FOK fill size would leave a residual.
    #[error("FOK not fully fillable")]
    FokNotFullyFillable,

    /// `OrderCancelRequest` for an order already in a terminal state.
    #[error("cancel too late, order already terminal")]
    CancelTooLate,

    /// `OrderCancelRequest` for an order this broker has no record of.
    #[error("cancel unknown order")]
    CancelUnknown,

    /// Order store / symbol registry access failed.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl BrokerError {
    /// Text placed in tag 58 (`Text`) of a wire rejection, or returned to an admin caller.
    pub fn wire_text(&self) -> String {
        self.to_string()
    }

    /// `CxlRejReason` (tag 102) for an `OrderCancelReject`, when this error arose from a
    /// FIX-originated `OrderCancelRequest`. `None` for errors that have no cancel-reject mapping.
    pub fn cxl_rej_reason(&self) -> Option<&'static str> {
        match self {
            BrokerError::CancelTooLate => Some("0"),
            BrokerError::CancelUnknown => Some("1"),
            BrokerError::IllegalTransition(_) => Some("4"),
            _ => None,
        }
    }
}
