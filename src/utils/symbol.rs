// 交易对符号工具 - Binance合约符号为币种与计价货币直接拼接的大写形式
// （如 DOGEUSDC），行情流名称使用小写加频道后缀（如 dogeusdc@bookTicker）

/// 由币种与合约计价货币拼出交易对符号
pub fn contract_symbol(coin: &str, contract: &str) -> String {
    format!("{}{}", coin.to_uppercase(), contract.to_uppercase())
}

/// 行情流名称
pub fn stream_name(symbol: &str, channel: &str) -> String {
    format!("{}@{}", symbol.to_lowercase(), channel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_symbol() {
        assert_eq!(contract_symbol("doge", "usdc"), "DOGEUSDC");
        assert_eq!(contract_symbol("BTC", "USDT"), "BTCUSDT");
    }

    #[test]
    fn test_stream_name() {
        assert_eq!(stream_name("DOGEUSDC", "bookTicker"), "dogeusdc@bookTicker");
    }
}
