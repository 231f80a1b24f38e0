//! 订单相关数据模型
//!
//! 初始化信息 → 订单参数 → 提交结果

use crate::error::{Result, SeckillError};
use crate::infrastructure::codec;
use crate::models::target::PurchaseTarget;
use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;

/// 京东 "提交过快" 的返回码
pub const RATE_LIMITED_CODE: i64 = 60017;

/// 接口中的 id 有时是数字有时是字符串，统一转成字符串
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match JsonValue::deserialize(deserializer)? {
        JsonValue::String(s) => s,
        JsonValue::Null => String::new(),
        other => other.to_string(),
    })
}

/// 收货地址
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    #[serde(deserialize_with = "string_or_number")]
    pub province_id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub city_id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub county_id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub town_id: String,
    pub address_detail: String,
    pub mobile: String,
    pub mobile_key: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// 发票信息（可能不返回）
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceInfo {
    #[serde(default, deserialize_with = "string_or_number")]
    pub invoice_title: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub invoice_content_type: String,
    #[serde(default)]
    pub invoice_phone: String,
    #[serde(default)]
    pub invoice_phone_key: String,
}

impl InvoiceInfo {
    /// `"invoiceInfo": {}` 与没有发票信息等同
    pub fn is_empty(&self) -> bool {
        self.invoice_title.is_empty()
            && self.invoice_content_type.is_empty()
            && self.invoice_phone.is_empty()
            && self.invoice_phone_key.is_empty()
    }
}

/// 秒杀初始化信息（地址、发票、token）
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderInitInfo {
    pub address_list: Vec<Address>,
    #[serde(default)]
    pub invoice_info: Option<InvoiceInfo>,
    pub token: String,
}

impl OrderInitInfo {
    /// 从接口原始响应解析初始化信息
    ///
    /// 无法解析或没有收货地址时返回 `OrderInitUnavailable`
    pub fn from_body(body: &str) -> Result<Self> {
        let info: OrderInitInfo = codec::parse_json(body).map_err(|e| {
            SeckillError::OrderInitUnavailable(format!(
                "{} (返回信息: {})",
                e,
                codec::truncate_text(body, 128)
            ))
        })?;
        if info.address_list.is_empty() {
            return Err(SeckillError::OrderInitUnavailable(
                "账号没有收货地址".to_string(),
            ));
        }
        Ok(info)
    }

    /// 默认地址（列表第一项）
    pub fn default_address(&self) -> &Address {
        &self.address_list[0]
    }
}

/// 下单需要的静态密钥
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSecrets {
    pub payment_pwd: String,
    pub eid: String,
    pub fp: String,
}

/// 提交订单的表单参数（保持字段顺序）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderPayload {
    fields: Vec<(&'static str, String)>,
}

impl OrderPayload {
    /// 由初始化信息 + 抢购目标 + 密钥组装订单参数，无 I/O
    pub fn assemble(info: &OrderInitInfo, target: &PurchaseTarget, secrets: &OrderSecrets) -> Self {
        let address = info.default_address();
        let invoice = info.invoice_info.as_ref().filter(|i| !i.is_empty());
        let invoice_field = |pick: fn(&InvoiceInfo) -> &String, fallback: &str| {
            invoice
                .map(pick)
                .filter(|v| !v.is_empty())
                .cloned()
                .unwrap_or_else(|| fallback.to_string())
        };

        let fields = vec![
            ("skuId", target.sku_id.clone()),
            ("num", target.quantity.to_string()),
            ("addressId", address.id.clone()),
            ("yuShou", "true".to_string()),
            ("isModifyAddress", "false".to_string()),
            ("name", address.name.clone()),
            ("provinceId", address.province_id.clone()),
            ("cityId", address.city_id.clone()),
            ("countyId", address.county_id.clone()),
            ("townId", address.town_id.clone()),
            ("addressDetail", address.address_detail.clone()),
            ("mobile", address.mobile.clone()),
            ("mobileKey", address.mobile_key.clone()),
            ("email", address.email.clone().unwrap_or_default()),
            ("postCode", String::new()),
            ("invoiceTitle", invoice_field(|i| &i.invoice_title, "-1")),
            ("invoiceCompanyName", String::new()),
            ("invoiceContent", invoice_field(|i| &i.invoice_content_type, "1")),
            ("invoiceTaxpayerNO", String::new()),
            ("invoiceEmail", String::new()),
            ("invoicePhone", invoice_field(|i| &i.invoice_phone, "")),
            ("invoicePhoneKey", invoice_field(|i| &i.invoice_phone_key, "")),
            ("invoice", invoice.is_some().to_string()),
            ("password", secrets.payment_pwd.clone()),
            ("codTimeType", "3".to_string()),
            ("paymentType", "4".to_string()),
            ("areaCode", String::new()),
            ("overseas", "0".to_string()),
            ("phone", String::new()),
            ("eid", secrets.eid.clone()),
            ("fp", secrets.fp.clone()),
            ("token", info.token.clone()),
            ("pru", String::new()),
        ];
        Self { fields }
    }

    pub fn fields(&self) -> &[(&'static str, String)] {
        &self.fields
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// 抢购成功的订单
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedOrder {
    pub order_id: String,
    pub total_money: String,
    pub pay_url: String,
}

/// 单次提交的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptResult {
    /// 抢购成功
    Accepted(AcceptedOrder),
    /// 服务端明确拒绝（没抢到 / 提交过快 / 系统繁忙）
    Rejected { code: i64, message: String },
    /// 响应无法解析或网络异常
    TransientFailure(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    #[serde(default)]
    success: bool,
    #[serde(default, deserialize_with = "string_or_number")]
    order_id: String,
    #[serde(default, deserialize_with = "string_or_number")]
    total_money: String,
    #[serde(default)]
    pc_url: String,
    #[serde(default)]
    result_code: i64,
    #[serde(default)]
    error_message: String,
}

impl AttemptResult {
    /// 解释提交订单接口的响应
    ///
    /// ```text
    /// {"appUrl":"..","orderId":820227..,"pcUrl":"..","resultCode":0,"success":true,"totalMoney":".."}
    /// {"errorMessage":"很遗憾没有抢到，再接再厉哦。","orderId":0,"resultCode":60074,"success":false}
    /// ```
    pub fn from_submit_body(body: &str) -> Self {
        match codec::parse_json::<SubmitResponse>(body) {
            Ok(resp) if resp.success => AttemptResult::Accepted(AcceptedOrder {
                order_id: resp.order_id,
                total_money: resp.total_money,
                pay_url: codec::absolute_url(&resp.pc_url),
            }),
            Ok(resp) => AttemptResult::Rejected {
                code: resp.result_code,
                message: resp.error_message,
            },
            Err(e) => AttemptResult::TransientFailure(format!(
                "{}, 返回信息: {}",
                e,
                codec::truncate_text(body, 128)
            )),
        }
    }
}

/// 单个抢购线程的最终结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    Success(AcceptedOrder),
    /// 被停止且没有抢到
    Exhausted,
}
