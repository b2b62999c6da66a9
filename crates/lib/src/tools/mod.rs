//! Tool layer: the market-data function catalog advertised to the model and the bridge that
//! runs the model's function calls against a [`MarketDataProvider`](crate::market::MarketDataProvider).

mod market;

pub use crate::llm::ToolDefinition;
pub use market::{
    execute_market_function, FunctionCatalog, DEFAULT_HISTORY_COUNT, GET_HISTORICAL_DATA,
    GET_PRICE, MAX_HISTORY_COUNT,
};
