//! Deterministic identifiers.
//!
//! Every row a replayed operation may write again gets an id derived from
//! stable inputs, so a second write lands on the same key and is ignored.
//!
//! | What | Key |
//! |---|---|
//! | sale stock movement | `sale:{store}:{sale}:{product}` |
//! | void restoration | `void:{store}:{sale}:{product}` |
//! | refund restoration | `refund:{store}:{sale}:{product}` |
//! | manual adjustment | `adjust:{store}:{product}:{request}` |
//! | restock | `restock:{store}:{product}:{request}` |
//! | line item | `{sale}:{line_index}` |
//! | sale payment | `{sale}:pay:{request_id}` or `{sale}:pay:{index}` |
//! | refund row | `{sale}:refund:{request}` |
//! | account payment | `acct:{store}:{request}` |

pub fn sale_stock_key(store_id: &str, sale_id: &str, product_id: &str) -> String {
    format!("sale:{}:{}:{}", store_id, sale_id, product_id)
}

pub fn void_stock_key(store_id: &str, sale_id: &str, product_id: &str) -> String {
    format!("void:{}:{}:{}", store_id, sale_id, product_id)
}

pub fn refund_stock_key(store_id: &str, sale_id: &str, product_id: &str) -> String {
    format!("refund:{}:{}:{}", store_id, sale_id, product_id)
}

pub fn adjust_stock_key(store_id: &str, product_id: &str, request_id: &str) -> String {
    format!("adjust:{}:{}:{}", store_id, product_id, request_id)
}

pub fn restock_key(store_id: &str, product_id: &str, request_id: &str) -> String {
    format!("restock:{}:{}:{}", store_id, product_id, request_id)
}

pub fn line_item_id(sale_id: &str, line_index: u32) -> String {
    format!("{}:{}", sale_id, line_index)
}

/// Explicit tender ids win over the position in the payment list.
pub fn sale_payment_id(sale_id: &str, request_id: Option<&str>, index: usize) -> String {
    match request_id {
        Some(request_id) => format!("{}:pay:{}", sale_id, request_id),
        None => format!("{}:pay:{}", sale_id, index),
    }
}

pub fn refund_id(sale_id: &str, request_id: &str) -> String {
    format!("{}:refund:{}", sale_id, request_id)
}

pub fn account_payment_id(store_id: &str, request_id: &str) -> String {
    format!("acct:{}:{}", store_id, request_id)
}
