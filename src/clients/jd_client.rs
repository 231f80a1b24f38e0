/// 京东 HTTP 客户端
///
/// 封装所有与京东接口相关的调用逻辑，登录态保存在共享的 cookie jar 中
use crate::config::{Config, Endpoints};
use crate::error::{Result, SeckillError};
use crate::infrastructure::codec::{self, absolute_url, fill_template};
use crate::infrastructure::CredentialBlob;
use crate::models::{OrderInitInfo, OrderPayload};
use crate::services::{AuthApi, Backoff, ServerTimeProbe, TicketPoll};
use crate::workflow::{AttemptCtx, ReserveApi, SeckillApi};
use async_trait::async_trait;
use chrono::Local;
use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{redirect, Client, Response, Url};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
];

const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3";

/// 二维码接口写入的 cookie，轮询扫码状态时作为 token
const QR_TOKEN_COOKIE: &str = "wlfstk_smdl";

/// 获取用户信息时的最大尝试次数
const NICKNAME_TRIES: u32 = 5;

/// 京东客户端
///
/// 两个 `reqwest::Client` 共用同一个 cookie jar：
/// - `client` 跟随跳转，用于普通页面
/// - `no_redirect` 不跟随跳转，用于验证登录和抢购接口
pub struct JdClient {
    client: Client,
    no_redirect: Client,
    jar: Arc<Jar>,
    endpoints: Endpoints,
    sku_id: String,
    quantity: u32,
    cookie_domain: String,
    time_api_timeout: Duration,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerTimeResponse {
    server_time: i64,
}

#[derive(Deserialize)]
struct TicketResponse {
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    ticket: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TicketValidation {
    return_code: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserInfo {
    #[serde(default)]
    nick_name: String,
}

/// 抢购链接 / 预约链接接口都只关心 `url`
#[derive(Deserialize)]
struct LinkResponse {
    #[serde(default)]
    url: Option<String>,
}

impl JdClient {
    /// 创建新的京东客户端
    pub fn new(config: &Config) -> Result<Self> {
        let jar = Arc::new(Jar::default());
        let user_agent = USER_AGENTS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(USER_AGENTS[0]);
        debug!("User-Agent: {}", user_agent);

        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_static(user_agent));
        headers.insert(header::ACCEPT, HeaderValue::from_static(ACCEPT));
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));

        let timeout = Duration::from_millis(config.request_timeout_ms);
        let client = Client::builder()
            .default_headers(headers.clone())
            .cookie_provider(jar.clone())
            .timeout(timeout)
            .build()
            .map_err(|e| SeckillError::http("client", e))?;
        let no_redirect = Client::builder()
            .default_headers(headers)
            .cookie_provider(jar.clone())
            .redirect(redirect::Policy::none())
            .timeout(timeout)
            .build()
            .map_err(|e| SeckillError::http("client", e))?;

        Ok(Self {
            client,
            no_redirect,
            jar,
            endpoints: config.endpoints.clone(),
            sku_id: config.sku_id.clone(),
            quantity: config.seckill_num,
            cookie_domain: config.cookie_domain.clone(),
            time_api_timeout: Duration::from_millis(config.time_api_timeout_ms),
        })
    }

    /// 检索当前登录用户的昵称
    ///
    /// 用户信息接口偶尔返回非 JSONP 的页面，重试几次
    pub async fn fetch_nickname(&self) -> Result<String> {
        let backoff = Backoff::default();
        let query = [("callback", jquery_callback()), ("_", now_millis().to_string())];

        let mut text = String::new();
        for attempt in 1..=NICKNAME_TRIES {
            text = self
                .client
                .get(&self.endpoints.user_info)
                .header(header::REFERER, &self.endpoints.user_info_refer)
                .query(&query)
                .send()
                .await
                .map_err(|e| SeckillError::http("user_info", e))?
                .text()
                .await
                .map_err(|e| SeckillError::http("user_info", e))?;
            if text.starts_with("jQuery") {
                break;
            }
            if attempt < NICKNAME_TRIES {
                tokio::time::sleep(backoff.delay(attempt as u64)).await;
            }
        }

        let info: UserInfo = codec::parse_json(&text)?;
        Ok(info.nick_name)
    }

    /// 检索商品名称（页面标题）
    pub async fn fetch_sku_title(&self) -> Result<Option<String>> {
        let url = fill_template(&self.endpoints.product_info, &[&self.sku_id]);
        let html = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SeckillError::http("product_info", e))?
            .text()
            .await
            .map_err(|e| SeckillError::http("product_info", e))?;
        Ok(codec::extract_title(&html))
    }

    /// 导出当前登录态
    pub fn export_credentials(&self) -> CredentialBlob {
        let mut cookies = BTreeMap::new();
        for url in self.cookie_urls() {
            let Some(value) = self.jar.cookies(&url) else {
                continue;
            };
            let Ok(value) = value.to_str() else {
                continue;
            };
            for pair in value.split(';').map(str::trim).filter(|p| !p.is_empty()) {
                if let Some((name, _)) = pair.split_once('=') {
                    cookies.entry(name.to_string()).or_insert_with(|| pair.to_string());
                }
            }
        }
        CredentialBlob::new(cookies.into_values().collect())
    }

    /// 导入本地保存的登录态
    ///
    /// 属于 `cookie_domain` 的接口共享一份域 cookie，其它主机各自写入
    pub fn import_credentials(&self, blob: &CredentialBlob) {
        for url in self.cookie_urls() {
            let in_domain = url
                .host_str()
                .is_some_and(|host| host_matches(host, &self.cookie_domain));
            for pair in &blob.cookies {
                let cookie = if in_domain {
                    format!("{}; Domain={}; Path=/", pair, self.cookie_domain)
                } else {
                    format!("{}; Path=/", pair)
                };
                self.jar.add_cookie_str(&cookie, &url);
            }
        }
        debug!("已导入 {} 个 cookie", blob.cookies.len());
    }

    /// 读取 jar 中对 `url` 可见的某个 cookie
    fn cookie_value(&self, url: &str, name: &str) -> Option<String> {
        let url = Url::parse(url).ok()?;
        let header = self.jar.cookies(&url)?;
        header
            .to_str()
            .ok()?
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.to_string())
    }

    /// 所有接口的主机，去重
    fn cookie_urls(&self) -> Vec<Url> {
        let e = &self.endpoints;
        let mut urls: Vec<Url> = Vec::new();
        for raw in [
            &e.user_order_list,
            &e.qr_image_show,
            &e.qr_ticket,
            &e.qr_ticket_validate,
            &e.user_info,
            &e.product_info,
            &e.yushow,
            &e.get_seckill_link,
            &e.request_seckill_checkout,
            &e.seckill_init,
            &e.submit_order,
        ] {
            let Ok(url) = Url::parse(raw) else {
                continue;
            };
            let Some(host) = url.host_str() else {
                continue;
            };
            let Ok(root) = Url::parse(&format!("{}://{}/", url.scheme(), host_with_port(&url, host)))
            else {
                continue;
            };
            if !urls.contains(&root) {
                urls.push(root);
            }
        }
        urls
    }

    async fn fetch_link(&self, url: &str, endpoint: &str, query: &[(&str, String)], referer: &str) -> Result<Option<String>> {
        let text = self
            .client
            .get(url)
            .header(header::REFERER, referer)
            .query(query)
            .send()
            .await
            .map_err(|e| SeckillError::http(endpoint, e))?
            .text()
            .await
            .map_err(|e| SeckillError::http(endpoint, e))?;
        let link: LinkResponse = codec::parse_json(&text)?;
        Ok(link.url.filter(|u| !u.is_empty()))
    }
}

// ========== 时间同步 ==========

#[async_trait]
impl ServerTimeProbe for JdClient {
    async fn server_time_millis(&self) -> Result<i64> {
        let text = self
            .client
            .get(&self.endpoints.jd_time_api)
            .timeout(self.time_api_timeout)
            .send()
            .await
            .map_err(|e| SeckillError::ClockUnavailable(e.to_string()))?
            .text()
            .await
            .map_err(|e| SeckillError::ClockUnavailable(e.to_string()))?;
        let resp: ServerTimeResponse = codec::parse_json(&text)
            .map_err(|e| SeckillError::ClockUnavailable(e.to_string()))?;
        Ok(resp.server_time)
    }
}

// ========== 登录 ==========

#[async_trait]
impl AuthApi for JdClient {
    async fn probe_credentials(&self) -> Result<bool> {
        let resp = self
            .no_redirect
            .get(&self.endpoints.user_order_list)
            .query(&[("rid", now_millis().to_string())])
            .send()
            .await
            .map_err(|e| SeckillError::http("user_order_list", e))?;
        Ok(resp.status().is_success())
    }

    async fn fetch_qr_image(&self) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get(&self.endpoints.qr_image_show)
            .header(header::REFERER, &self.endpoints.qr_image_show_refer)
            .query(&[
                ("appid", "133".to_string()),
                ("size", "147".to_string()),
                ("t", now_millis().to_string()),
            ])
            .send()
            .await
            .map_err(|e| SeckillError::http("qr_image_show", e))?;

        if !resp.status().is_success() {
            error!("检索二维码失败. HTTP {}", resp.status());
            return Err(SeckillError::LoginFailed(format!(
                "检索二维码失败, HTTP {}",
                resp.status()
            )));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| SeckillError::http("qr_image_show", e))?;
        Ok(bytes.to_vec())
    }

    async fn poll_ticket(&self) -> Result<TicketPoll> {
        let token = self
            .cookie_value(&self.endpoints.qr_ticket, QR_TOKEN_COOKIE)
            .unwrap_or_default();
        let resp = self
            .client
            .get(&self.endpoints.qr_ticket)
            .header(header::REFERER, &self.endpoints.qr_ticket_refer)
            .query(&[
                ("appid", "133".to_string()),
                ("callback", jquery_callback()),
                ("token", token),
                ("_", now_millis().to_string()),
            ])
            .send()
            .await
            .map_err(|e| SeckillError::http("qr_ticket", e))?;

        if !resp.status().is_success() {
            return Ok(TicketPoll::Pending {
                code: i64::from(resp.status().as_u16()),
                message: "检索二维码登陆状态失败".to_string(),
            });
        }
        let text = resp
            .text()
            .await
            .map_err(|e| SeckillError::http("qr_ticket", e))?;
        Ok(interpret_ticket(codec::parse_json(&text)?))
    }

    async fn validate_ticket(&self, ticket: &str) -> Result<bool> {
        let resp = self
            .client
            .get(&self.endpoints.qr_ticket_validate)
            .header(header::REFERER, &self.endpoints.qr_ticket_validate_refer)
            .query(&[("t", ticket)])
            .send()
            .await
            .map_err(|e| SeckillError::http("qr_ticket_validate", e))?;

        if !resp.status().is_success() {
            error!("验证二维码登陆成功返回的 Ticket 失败... HTTP {}", resp.status());
            return Ok(false);
        }
        let text = resp
            .text()
            .await
            .map_err(|e| SeckillError::http("qr_ticket_validate", e))?;
        let validation: TicketValidation = codec::parse_json(&text)?;
        if validation.return_code != 0 {
            info!("{}", codec::truncate_text(&text, 128));
        }
        Ok(validation.return_code == 0)
    }
}

/// 200 拿到 ticket；201 未扫描、202 待确认继续等；其它视为二维码失效
fn interpret_ticket(resp: TicketResponse) -> TicketPoll {
    match (resp.code, resp.ticket) {
        (200, Some(ticket)) if !ticket.is_empty() => TicketPoll::Ready(ticket),
        (200, _) | (201, _) | (202, _) => TicketPoll::Pending {
            code: resp.code,
            message: resp.msg,
        },
        (code, _) => TicketPoll::Rejected {
            code,
            message: resp.msg,
        },
    }
}

// ========== 抢购 ==========

#[async_trait]
impl SeckillApi for JdClient {
    async fn acquire_route(&self, ctx: &AttemptCtx) -> Result<String> {
        let referer = fill_template(&self.endpoints.get_seckill_link_refer, &[&self.sku_id]);
        let query = [
            ("callback", jquery_callback()),
            ("skuId", self.sku_id.clone()),
            ("from", "pc".to_string()),
            ("_", now_millis().to_string()),
        ];
        let Some(route) = self
            .fetch_link(&self.endpoints.get_seckill_link, "get_seckill_link", &query, &referer)
            .await?
        else {
            return Err(SeckillError::RouteUnavailable(
                "抢购链接获取失败，稍后自动重试".to_string(),
            ));
        };

        let seckill_url = seckill_url_from_route(&absolute_url(&route));
        info!("{} 抢购链接获取成功: {}", ctx, seckill_url);

        info!("{} 访问商品的抢购连接...", ctx);
        let resp = self
            .no_redirect
            .get(&seckill_url)
            .header(
                header::REFERER,
                fill_template(&self.endpoints.request_seckill_refer, &[&self.sku_id]),
            )
            .send()
            .await
            .map_err(|e| SeckillError::http("request_seckill", e))?;
        ensure_logged_in(&resp)?;
        Ok(seckill_url)
    }

    async fn prime_checkout(&self, ctx: &AttemptCtx) -> Result<()> {
        info!("{} 访问抢购订单结算页面...", ctx);
        let resp = self
            .no_redirect
            .get(&self.endpoints.request_seckill_checkout)
            .header(
                header::REFERER,
                fill_template(&self.endpoints.request_seckill_checkout_refer, &[&self.sku_id]),
            )
            .query(&[
                ("skuId", self.sku_id.clone()),
                ("num", self.quantity.to_string()),
                ("rid", now_secs().to_string()),
            ])
            .send()
            .await
            .map_err(|e| SeckillError::http("request_seckill_checkout", e))?;
        ensure_logged_in(&resp)
    }

    async fn fetch_order_init(&self, ctx: &AttemptCtx) -> Result<OrderInitInfo> {
        info!("{} 获取秒杀初始化信息...", ctx);
        let resp = self
            .no_redirect
            .post(&self.endpoints.seckill_init)
            .form(&[
                ("sku", self.sku_id.clone()),
                ("num", self.quantity.to_string()),
                ("isModifyAddress", "false".to_string()),
            ])
            .send()
            .await
            .map_err(|e| SeckillError::http("seckill_init", e))?;
        ensure_logged_in(&resp)?;
        let text = resp
            .text()
            .await
            .map_err(|e| SeckillError::http("seckill_init", e))?;
        OrderInitInfo::from_body(&text)
    }

    async fn submit_order(&self, ctx: &AttemptCtx, payload: &OrderPayload) -> Result<String> {
        debug!("{} 订单参数: {:?}", ctx, payload.fields());
        let quantity = self.quantity.to_string();
        let rid = now_secs().to_string();
        let referer = fill_template(
            &self.endpoints.submit_order_refer,
            &[&self.sku_id, &quantity, &rid],
        );
        let resp = self
            .no_redirect
            .post(&self.endpoints.submit_order)
            .header(header::REFERER, referer)
            .query(&[("skuId", self.sku_id.as_str())])
            .form(payload.fields())
            .send()
            .await
            .map_err(|e| SeckillError::http("submit_order", e))?;
        ensure_logged_in(&resp)?;
        resp.text()
            .await
            .map_err(|e| SeckillError::http("submit_order", e))
    }
}

// ========== 预约 ==========

#[async_trait]
impl ReserveApi for JdClient {
    async fn fetch_reserve_url(&self) -> Result<String> {
        let referer = fill_template(&self.endpoints.yushow_refer, &[&self.sku_id]);
        let query = [
            ("callback", "fetchJSON".to_string()),
            ("sku", self.sku_id.clone()),
            ("_", now_millis().to_string()),
        ];
        self.fetch_link(&self.endpoints.yushow, "yushow", &query, &referer)
            .await?
            .map(|url| absolute_url(&url))
            .ok_or_else(|| SeckillError::RouteUnavailable("预约链接获取失败".to_string()))
    }

    async fn visit_reserve_url(&self, url: &str) -> Result<()> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SeckillError::http("reserve", e))?;
        if !resp.status().is_success() {
            warn!("预约链接返回 HTTP {}", resp.status());
        }
        Ok(())
    }
}

// ========== 辅助函数 ==========

/// 抢购接口被重定向到登录页说明登录态已失效
fn ensure_logged_in(resp: &Response) -> Result<()> {
    if !resp.status().is_redirection() {
        return Ok(());
    }
    let location = resp
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if is_login_url(location) {
        warn!("请求被重定向到登录页: {}", location);
        return Err(SeckillError::SessionInvalid);
    }
    Ok(())
}

fn is_login_url(location: &str) -> bool {
    location.contains("passport.jd.com") || location.contains("/login")
}

/// `https://divide.jd.com/user_routing?...` → `https://marathon.jd.com/captcha.html?...`
pub fn seckill_url_from_route(route: &str) -> String {
    route
        .replace("divide", "marathon")
        .replace("user_routing", "captcha.html")
}

/// JSONP 回调名 `jQuery<7位随机数>`
pub fn jquery_callback() -> String {
    format!("jQuery{}", rand::thread_rng().gen_range(1_000_000..=9_999_999))
}

fn host_matches(host: &str, domain: &str) -> bool {
    let domain = domain.trim_start_matches('.');
    !domain.is_empty() && (host == domain || host.ends_with(&format!(".{}", domain)))
}

fn host_with_port(url: &Url, host: &str) -> String {
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

fn now_millis() -> i64 {
    Local::now().timestamp_millis()
}

fn now_secs() -> i64 {
    Local::now().timestamp()
}
