/// Key of the `data` entry naming the process that generated an event.
pub const DATA_ORIGIN: &str = "origin";

/// Key of the broker identity stored on imported events.
pub const DATA_TR_UID: &str = "tr_uid";

/// Key holding the untouched broker payload of an imported event.
pub const DATA_TR_RAW: &str = "tr_raw";

pub const DATA_LOAN_ID: &str = "loan_id";
pub const DATA_PERIOD: &str = "period";

/// Origin of events generated from a recurring deposit.
pub const ORIGIN_AUTO_DCA: &str = "auto_dca";

/// Origin of events generated from a loan installment.
pub const ORIGIN_AUTO_LOAN: &str = "auto_loan";

pub const CATEGORY_DCA: &str = "dca";
pub const CATEGORY_LOAN_PAYMENT: &str = "loan_payment";
pub const CATEGORY_BUY: &str = "buy";
pub const CATEGORY_SELL: &str = "sell";
pub const CATEGORY_DIVIDEND: &str = "dividend";
pub const CATEGORY_INTEREST: &str = "interest";
pub const CATEGORY_FEE: &str = "fee";
pub const CATEGORY_DEPOSIT: &str = "deposit";
pub const CATEGORY_PAY_IN: &str = "pay_in";
