/// Transaction ID type
pub type TxnId = u32;

/// Resource ID type (databases, tables and pages share one id space)
pub type ResourceId = u32;
