//! End-to-end pipeline wiring over the in-memory stores.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kuryr::{
    ActiveStatus, AuditStatus, BizConfig, BizConfigCache, CallbackClient, CallbackClientRegistry,
    CallbackConfig, CallbackLogStore, CallbackLog, CallbackNotifyRequest, CallbackNotifyResponse,
    CallbackReconciler, Channel, ChannelDispatcher, ChannelSend, ChannelTemplate, Clock, Dst,
    FailoverSender, HashSharding, IdMinter, KuryrError, ManualClock, MemBizConfigStore,
    MemCallbackLogStore, MemNotificationStore, MemProviderStore, MemTemplateStore, Notification,
    NotificationSender, OwnerType, Provider, ProviderBinding, ReconcilerConfig, Result,
    RetryPolicy, SecretCipher, SendStatus, SendStrategy, SendStrategyDispatcher,
    SeqSelectorBuilder, ShardStrategy, SmsApi, SmsProvider, SmsSendRequest, SmsSendResponse,
    SmsSendStatus, TemplateRef, TemplateVersion, DeferredStrategy, ImmediateStrategy,
    EPOCH_MILLIS,
};

pub const TPL_ID: u64 = 100;
pub const TPL_VERSION_ID: u64 = 10;
pub const BIZ_ID: u64 = 1;
pub const BIZ_KEY: &str = "k1";
pub const SERVICE_NAME: &str = "tenant-a";

pub fn notification() -> Notification {
    Notification {
        id: 0,
        biz_id: BIZ_ID,
        biz_key: BIZ_KEY.into(),
        receivers: vec!["+8613800000001".into()],
        channel: Channel::Sms,
        template: TemplateRef {
            id: TPL_ID,
            version: TPL_VERSION_ID,
            params: HashMap::from([("code".into(), "123".into())]),
        },
        send_status: SendStatus::Prepare,
        scheduled_start: None,
        scheduled_end: None,
        version: 0,
        strategy: SendStrategy::Immediate,
    }
}

pub fn template(provider_ids: &[u64]) -> ChannelTemplate {
    ChannelTemplate {
        id: TPL_ID,
        owner_id: BIZ_ID,
        owner_type: OwnerType::Organization,
        name: "verify-code".into(),
        channel: Channel::Sms,
        activated_version_id: TPL_VERSION_ID,
        versions: vec![TemplateVersion {
            id: TPL_VERSION_ID,
            tpl_id: TPL_ID,
            name: "v1".into(),
            signature: "Kuryr".into(),
            content: "your code is {code}".into(),
            audit_status: AuditStatus::Approved,
            providers: provider_ids
                .iter()
                .map(|&provider_id| ProviderBinding {
                    id: provider_id * 10,
                    tpl_id: TPL_ID,
                    tpl_version_id: TPL_VERSION_ID,
                    provider_id,
                    provider_name: format!("provider-{provider_id}"),
                    provider_channel: Channel::Sms,
                    provider_tpl_id: format!("P-{provider_id}"),
                    audit_status: AuditStatus::Approved,
                })
                .collect(),
        }],
    }
}

pub fn provider_record(id: u64) -> Provider {
    Provider {
        id,
        name: format!("provider-{id}"),
        channel: Channel::Sms,
        endpoint: "sms.example.com".into(),
        region: "ap-guangzhou".into(),
        api_id: "AKID".into(),
        api_secret: "secret".into(),
        weight: 10,
        qps_limit: 100,
        daily_limit: 10_000,
        active_status: ActiveStatus::Active,
    }
}

pub fn biz_config(callback: Option<&str>, retry_policy: RetryPolicy) -> BizConfig {
    BizConfig {
        biz_id: BIZ_ID,
        owner_type: OwnerType::Organization,
        channel_config: None,
        quota_config: None,
        callback_config: callback.map(|service_name| CallbackConfig {
            service_name: service_name.into(),
            retry_policy,
        }),
        rate_limit: 0,
    }
}

/// Vendor client fake: accepts, rejects with a code, or errors outright.
#[derive(Clone)]
pub struct FakeSmsApi {
    mode: SmsApiMode,
    calls: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<SmsSendRequest>>>,
}

#[derive(Clone)]
pub enum SmsApiMode {
    Accept,
    RejectCode(String),
    TransportError,
}

impl FakeSmsApi {
    pub fn new(mode: SmsApiMode) -> Self {
        Self { mode, calls: Arc::new(AtomicUsize::new(0)), requests: Default::default() }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<SmsSendRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SmsApi for FakeSmsApi {
    async fn send(&self, req: SmsSendRequest) -> Result<SmsSendResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(req.clone());

        match &self.mode {
            SmsApiMode::TransportError => Err(KuryrError::internal("connection reset")),
            SmsApiMode::Accept => Ok(SmsSendResponse {
                request_id: "req-ok".into(),
                results: req
                    .phones
                    .iter()
                    .map(|phone| {
                        (
                            phone.clone(),
                            SmsSendStatus { code: "Ok".into(), message: "sent".into() },
                        )
                    })
                    .collect(),
            }),
            SmsApiMode::RejectCode(code) => Ok(SmsSendResponse {
                request_id: "req-rejected".into(),
                results: req
                    .phones
                    .iter()
                    .map(|phone| {
                        (
                            phone.clone(),
                            SmsSendStatus { code: code.clone(), message: "rejected".into() },
                        )
                    })
                    .collect(),
            }),
        }
    }
}

/// Tenant callback fake following a success/failure script (last entry
/// repeats), recording every request.
pub struct FakeCallbackClient {
    script: Mutex<Vec<bool>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<CallbackNotifyRequest>>,
}

impl FakeCallbackClient {
    pub fn new(script: Vec<bool>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<CallbackNotifyRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CallbackClient for FakeCallbackClient {
    async fn send_result_notify(
        &self,
        req: CallbackNotifyRequest,
    ) -> Result<CallbackNotifyResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(req);

        let mut script = self.script.lock().unwrap();
        let success =
            if script.len() > 1 { script.remove(0) } else { *script.first().unwrap_or(&true) };
        Ok(CallbackNotifyResponse {
            success,
            err_msg: (!success).then(|| "tenant said no".into()),
        })
    }
}

/// Callback-log store decorator that fails every read and write against the
/// named databases, standing in for dead connection pools.
pub struct FlakyCallbackLogStore {
    inner: Arc<MemCallbackLogStore>,
    fail_dbs: Vec<String>,
}

impl FlakyCallbackLogStore {
    pub fn new(inner: Arc<MemCallbackLogStore>, fail_dbs: &[&str]) -> Self {
        Self { inner, fail_dbs: fail_dbs.iter().map(|db| db.to_string()).collect() }
    }

    fn check(&self, dst: &Dst) -> Result<()> {
        if self.fail_dbs.iter().any(|db| *db == dst.db) {
            return Err(KuryrError::internal(format!("connection refused: {}", dst.db)));
        }
        Ok(())
    }
}

#[async_trait]
impl CallbackLogStore for FlakyCallbackLogStore {
    async fn upsert(&self, dst: &Dst, log: CallbackLog) -> Result<()> {
        self.check(dst)?;
        self.inner.upsert(dst, log).await
    }

    async fn find_due(
        &self,
        dst: &Dst,
        horizon: i64,
        cursor: u64,
        limit: usize,
    ) -> Result<Vec<CallbackLog>> {
        self.check(dst)?;
        self.inner.find_due(dst, horizon, cursor, limit).await
    }

    async fn batch_update(&self, dst: &Dst, logs: &[CallbackLog]) -> Result<()> {
        self.check(dst)?;
        self.inner.batch_update(dst, logs).await
    }

    async fn find_by_notification_ids(
        &self,
        dst: &Dst,
        notification_ids: &[u64],
    ) -> Result<Vec<CallbackLog>> {
        self.check(dst)?;
        self.inner.find_by_notification_ids(dst, notification_ids).await
    }
}

/// Everything wired together: dispatcher on the send side, reconciler on the
/// callback side, all over the same in-memory shards.
pub struct World {
    pub clock: Arc<ManualClock>,
    pub sharding: Arc<HashSharding>,
    pub notifications: Arc<MemNotificationStore>,
    pub callback_logs: Arc<MemCallbackLogStore>,
    pub biz_store: Arc<MemBizConfigStore>,
    pub registry: Arc<CallbackClientRegistry>,
    pub dispatcher: SendStrategyDispatcher,
    pub reconciler: CallbackReconciler,
    pub apis: Vec<FakeSmsApi>,
}

impl World {
    /// One SMS provider per `(provider_id, mode)` pair, in binding order.
    pub fn new(providers: Vec<(u64, SmsApiMode)>, retry_policy: RetryPolicy) -> Self {
        // A day past the id epoch so minted ids always carry timestamp bits.
        let clock = Arc::new(ManualClock::new(EPOCH_MILLIS + 86_400_000));
        let sharding = Arc::new(HashSharding::new("kuryr", "callback_log", 2, 2));
        let callback_logs = Arc::new(MemCallbackLogStore::new());
        let notifications = Arc::new(MemNotificationStore::with_callback_logs(
            callback_logs.clone(),
            sharding.clone(),
        ));

        let biz_store = Arc::new(MemBizConfigStore::new());
        biz_store.insert(biz_config(Some(SERVICE_NAME), retry_policy));
        let biz_configs = Arc::new(BizConfigCache::new(
            biz_store.clone(),
            None,
            kuryr::DEFAULT_LOCAL_TTL,
            clock.clone(),
        ));

        let provider_ids: Vec<u64> = providers.iter().map(|(id, _)| *id).collect();
        let templates = Arc::new(MemTemplateStore::new());
        templates.insert(template(&provider_ids));
        let provider_store = Arc::new(MemProviderStore::new(
            SecretCipher::new(&[3u8; 32]).expect("32-byte key"),
        ));

        let mut apis = Vec::new();
        let mut drivers: Vec<Arc<dyn kuryr::ProviderDriver>> = Vec::new();
        for (provider_id, mode) in providers {
            provider_store.insert(provider_record(provider_id)).expect("seed provider");
            let api = FakeSmsApi::new(mode);
            apis.push(api.clone());
            drivers.push(Arc::new(SmsProvider::new(
                provider_id,
                Arc::new(api),
                templates.clone(),
                provider_store.clone(),
            )));
        }

        let failover = FailoverSender::new(Arc::new(SeqSelectorBuilder::new(drivers)));
        let channel = Arc::new(ChannelDispatcher::new(HashMap::from([(
            Channel::Sms,
            Arc::new(failover) as Arc<dyn ChannelSend>,
        )])));

        let id_minter = Arc::new(IdMinter::new(clock.clone() as Arc<dyn Clock>));
        let sender = Arc::new(NotificationSender::new(
            channel,
            notifications.clone(),
            callback_logs.clone(),
            sharding.clone(),
            biz_configs.clone(),
            id_minter.clone(),
            clock.clone(),
            8,
        ));

        let immediate = Arc::new(ImmediateStrategy::new(
            notifications.clone(),
            biz_configs.clone(),
            id_minter.clone(),
            clock.clone(),
            sender,
        ));
        let deferred = Arc::new(DeferredStrategy::new(
            notifications.clone(),
            biz_configs.clone(),
            id_minter.clone(),
            clock.clone(),
        ));
        let dispatcher = SendStrategyDispatcher::new(
            immediate,
            deferred,
            id_minter,
            clock.clone(),
        );

        let registry = Arc::new(CallbackClientRegistry::new());
        let reconciler = CallbackReconciler::new(
            sharding.clone(),
            callback_logs.clone(),
            biz_configs,
            registry.clone(),
            clock.clone(),
            ReconcilerConfig::default(),
        );

        Self {
            clock,
            sharding,
            notifications,
            callback_logs,
            biz_store,
            registry,
            dispatcher,
            reconciler,
            apis,
        }
    }

    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis() as i64
    }

    pub fn tenant_shard(&self) -> Dst {
        self.sharding.shard(BIZ_ID, BIZ_KEY)
    }

    pub fn callback_rows(&self) -> Vec<CallbackLog> {
        self.callback_logs.rows(&self.tenant_shard())
    }
}
