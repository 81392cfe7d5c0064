// src/exchange/kraken.rs
use crate::config::RiskConfig;
use crate::domain::errors::{ExchangeError, ExchangeResult};
use crate::domain::models::{ActiveTrade, Candle, OrderAck, OrderType, Side, TradeStatus};
use crate::trading::ledger::TradeLedger;
use crate::trading::risk;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use log::{debug, info};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256, Sha512};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

type HmacSha512 = Hmac<Sha512>;

/// Envelope every Kraken REST response arrives in.
#[derive(Debug, Deserialize)]
struct KrakenResponse {
    #[serde(default)]
    error: Vec<String>,
    result: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct AddOrderResult {
    txid: Vec<String>,
    descr: AddOrderDescr,
}

#[derive(Debug, Deserialize)]
struct AddOrderDescr {
    #[serde(default)]
    order: String,
}

/// Authenticated Kraken REST client. Signs every private request and
/// records accepted orders in the shared trade ledger.
pub struct KrakenClient {
    api_key: String,
    api_secret: String,
    base_url: String,
    http: reqwest::Client,
    last_nonce: AtomicU64,
    risk: RiskConfig,
    ledger: Arc<TradeLedger>,
}

impl KrakenClient {
    pub fn new(
        api_key: &str,
        api_secret: &str,
        base_url: &str,
        risk: RiskConfig,
        ledger: Arc<TradeLedger>,
    ) -> ExchangeResult<Self> {
        if api_key.is_empty() || api_secret.is_empty() {
            return Err(ExchangeError::MissingCredentials);
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ExchangeError::Transport {
                endpoint: "client".to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            last_nonce: AtomicU64::new(0),
            risk,
            ledger,
        })
    }

    /// Strictly increasing nonce: wall-clock milliseconds, bumped past
    /// the previous value when the clock has not advanced.
    fn next_nonce(&self) -> u64 {
        let now = Utc::now().timestamp_millis() as u64;
        let mut last = self.last_nonce.load(Ordering::SeqCst);
        loop {
            let next = now.max(last + 1);
            match self.last_nonce.compare_exchange(
                last,
                next,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return next,
                Err(observed) => last = observed,
            }
        }
    }

    /// Kraken request signature:
    /// base64(HMAC-SHA512(base64decode(secret), path || SHA256(nonce || body))).
    fn sign(&self, path: &str, nonce: u64, body: &str) -> ExchangeResult<String> {
        let secret = BASE64
            .decode(&self.api_secret)
            .map_err(|e| ExchangeError::Signing(format!("invalid API secret: {}", e)))?;

        let mut sha = Sha256::new();
        sha.update(nonce.to_string().as_bytes());
        sha.update(body.as_bytes());
        let digest = sha.finalize();

        let mut mac = HmacSha512::new_from_slice(&secret)
            .map_err(|e| ExchangeError::Signing(e.to_string()))?;
        mac.update(path.as_bytes());
        mac.update(&digest);

        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }

    /// POST a signed request to a private endpoint and unwrap the
    /// response envelope.
    async fn private_request(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> ExchangeResult<Value> {
        let nonce = self.next_nonce();
        let path = format!("/0/private/{}", endpoint);

        // The serializer must not live across the await below: it is
        // not Send, and these futures run inside spawned tasks.
        let body = {
            let mut serializer = url::form_urlencoded::Serializer::new(String::new());
            serializer.append_pair("nonce", &nonce.to_string());
            for (key, value) in params {
                serializer.append_pair(key, value);
            }
            serializer.finish()
        };

        let signature = self.sign(&path, nonce, &body)?;

        debug!("POST {} nonce={}", path, nonce);
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .header("API-Key", &self.api_key)
            .header("API-Sign", signature)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| ExchangeError::Transport {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            })?;

        let payload: KrakenResponse =
            response.json().await.map_err(|e| ExchangeError::Parse {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            })?;

        if !payload.error.is_empty() {
            return Err(ExchangeError::Broker {
                endpoint: endpoint.to_string(),
                message: payload.error.join("; "),
            });
        }

        payload.result.ok_or_else(|| ExchangeError::Parse {
            endpoint: endpoint.to_string(),
            message: "response carried neither error nor result".to_string(),
        })
    }

    /// OHLC history for one pair at the given interval, ascending by
    /// candle time.
    pub async fn get_ohlc(
        &self,
        pair: &str,
        interval_minutes: u64,
    ) -> ExchangeResult<Vec<Candle>> {
        let endpoint = "OHLC";
        let result = self
            .private_request(
                endpoint,
                &[
                    ("pair", pair.to_string()),
                    ("interval", interval_minutes.to_string()),
                ],
            )
            .await?;

        // The result object keys candle arrays by the exchange's own pair
        // alias; "last" is a pagination cursor, everything else is data.
        let rows = result
            .as_object()
            .and_then(|obj| {
                obj.iter()
                    .find(|(k, v)| k.as_str() != "last" && v.is_array())
                    .map(|(_, v)| v)
            })
            .and_then(|v| v.as_array())
            .ok_or_else(|| ExchangeError::Parse {
                endpoint: endpoint.to_string(),
                message: "no candle array in result".to_string(),
            })?;

        let mut candles = Vec::with_capacity(rows.len());
        for row in rows {
            candles.push(parse_candle_row(row).ok_or_else(|| ExchangeError::Parse {
                endpoint: endpoint.to_string(),
                message: format!("malformed candle row: {}", row),
            })?);
        }
        candles.sort_by_key(|c| c.timestamp);
        Ok(candles)
    }

    /// Account balance per asset.
    pub async fn get_balance(&self) -> ExchangeResult<HashMap<String, Decimal>> {
        let result = self.private_request("Balance", &[]).await?;
        let obj = result.as_object().ok_or_else(|| ExchangeError::Parse {
            endpoint: "Balance".to_string(),
            message: "result is not an object".to_string(),
        })?;

        let mut balances = HashMap::new();
        for (asset, amount) in obj {
            let value = amount
                .as_str()
                .and_then(|s| Decimal::from_str(s).ok())
                .ok_or_else(|| ExchangeError::Parse {
                    endpoint: "Balance".to_string(),
                    message: format!("non-decimal balance for {}: {}", asset, amount),
                })?;
            balances.insert(asset.clone(), value);
        }
        Ok(balances)
    }

    /// Total account equity: the balance map summed.
    pub async fn total_equity(&self) -> ExchangeResult<Decimal> {
        let balances = self.get_balance().await?;
        Ok(balances.values().sum())
    }

    /// Open margin positions keyed by position txid.
    pub async fn get_open_positions(&self) -> ExchangeResult<HashMap<String, Value>> {
        let result = self.private_request("OpenPositions", &[]).await?;
        let obj = result.as_object().ok_or_else(|| ExchangeError::Parse {
            endpoint: "OpenPositions".to_string(),
            message: "result is not an object".to_string(),
        })?;
        Ok(obj
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    /// Submit an order with attached stop-loss/take-profit brackets and
    /// record it in the ledger. `price` is the limit price for limit
    /// orders and the bracket reference for market orders, so it is
    /// always required. Leverage beyond the configured ceiling is
    /// rejected before anything touches the network.
    pub async fn place_order(
        &self,
        pair: &str,
        order_type: OrderType,
        side: Side,
        volume: Decimal,
        price: Decimal,
        leverage: u32,
    ) -> ExchangeResult<OrderAck> {
        if leverage > self.risk.max_leverage {
            return Err(ExchangeError::RiskLimitExceeded(format!(
                "requested leverage {} exceeds maximum {}",
                leverage, self.risk.max_leverage
            )));
        }

        let (stop_loss, take_profit) = risk::bracket_prices(side, price, &self.risk);

        let mut params: Vec<(&str, String)> = vec![
            ("pair", pair.to_string()),
            ("type", side.as_str().to_string()),
            ("ordertype", order_type.as_str().to_string()),
            ("volume", volume.to_string()),
            ("close[ordertype]", "stop-loss-limit".to_string()),
            ("close[price]", stop_loss.to_string()),
            ("close[price2]", take_profit.to_string()),
        ];
        if order_type == OrderType::Limit {
            params.push(("price", price.to_string()));
        }
        if leverage > 1 {
            params.push(("leverage", leverage.to_string()));
        }

        let result = self.private_request("AddOrder", &params).await?;
        let ack: AddOrderResult =
            serde_json::from_value(result).map_err(|e| ExchangeError::Parse {
                endpoint: "AddOrder".to_string(),
                message: e.to_string(),
            })?;

        let order_id = ack
            .txid
            .first()
            .cloned()
            .ok_or_else(|| ExchangeError::Parse {
                endpoint: "AddOrder".to_string(),
                message: "AddOrder result carried no txid".to_string(),
            })?;

        info!(
            "Order accepted {}: {} ({} {} {} @ {})",
            order_id, ack.descr.order, side, volume, pair, price
        );

        self.ledger.record_open(ActiveTrade {
            order_id: order_id.clone(),
            instrument: pair.to_string(),
            side,
            order_type,
            volume,
            entry_price: price,
            stop_loss,
            take_profit,
            leverage,
            placed_at: Utc::now(),
            status: TradeStatus::Open,
            exit_price: None,
            pnl: None,
        });

        Ok(OrderAck {
            order_id,
            txids: ack.txid,
            description: ack.descr.order,
        })
    }
}

fn parse_candle_row(row: &Value) -> Option<Candle> {
    // OHLC rows: [time, open, high, low, close, vwap, volume, count]
    let fields = row.as_array()?;
    if fields.len() < 7 {
        return None;
    }
    let decimal_at = |i: usize| -> Option<Decimal> {
        let v = &fields[i];
        match v.as_str() {
            Some(s) => Decimal::from_str(s).ok(),
            None => v.as_f64().and_then(|f| Decimal::try_from(f).ok()),
        }
    };
    Some(Candle {
        timestamp: fields[0].as_i64()?,
        open: decimal_at(1)?,
        high: decimal_at(2)?,
        low: decimal_at(3)?,
        close: decimal_at(4)?,
        volume: decimal_at(6)?,
    })
}
