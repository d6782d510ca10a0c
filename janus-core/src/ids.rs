//! Routing key helpers: `vt_symbol` and `vt_orderid`.
//!
//! These are plain formatting/parsing helpers rather than newtypes wrapping
//! opaque data, because every adapter and the OMS cache need to build and
//! split them constantly; a `String` with two free functions is cheaper to
//! work with than a type that needs constructing at every call site.

/// Builds the internal routing key `"{symbol}.{exchange}"`.
pub fn vt_symbol(symbol: &str, exchange: &str) -> String {
    format!("{symbol}.{exchange}")
}

/// Splits a `vt_symbol` back into `(symbol, exchange)`. Returns `None` if the
/// key does not contain the `.` separator.
pub fn split_vt_symbol(vt_symbol: &str) -> Option<(&str, &str)> {
    vt_symbol.split_once('.')
}

/// Builds the server-lifetime-unique order key `"{account_alias}.{broker_orderid}"`.
pub fn vt_orderid(account_alias: &str, broker_orderid: &str) -> String {
    format!("{account_alias}.{broker_orderid}")
}

/// Splits a `vt_orderid` back into `(account_alias, broker_orderid)`.
pub fn split_vt_orderid(vt_orderid: &str) -> Option<(&str, &str)> {
    vt_orderid.split_once('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_and_splits_vt_symbol() {
        let key = vt_symbol("AAPL", "SMART");
        assert_eq!(key, "AAPL.SMART");
        assert_eq!(split_vt_symbol(&key), Some(("AAPL", "SMART")));
    }

    #[test]
    fn builds_and_splits_vt_orderid() {
        let key = vt_orderid("ib_main", "1");
        assert_eq!(key, "ib_main.1");
        assert_eq!(split_vt_orderid(&key), Some(("ib_main", "1")));
    }

    #[test]
    fn split_rejects_missing_separator() {
        assert_eq!(split_vt_symbol("AAPL"), None);
    }
}
