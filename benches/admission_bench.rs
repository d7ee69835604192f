//! Admission decision throughput.
//!
//! `can_show_now` runs on every navigation, so it has to stay cheap even
//! with a full connection history to scan.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use adgate_core::config::ConsentSettings;
use adgate_core::consent::{ConsentUpdate, FormResult, PrivacyOptionsResult};
use adgate_core::lifecycle::LoadRequest;
use adgate_core::network::ConnectivityCallback;
use adgate_core::{
    AdEvent, AdEventKind, AdGateConfig, AdGateEngine, AdSdk, AdSurface, Collaborators,
    ConnectivitySnapshot, ConnectivitySource, ConsentProvider, ConsentStatus, ManualClock,
    MemoryStore, ProviderError,
};

struct GrantedConsent;

impl ConsentProvider for GrantedConsent {
    fn request_consent_info_update(
        &self,
        _config: &ConsentSettings,
    ) -> Result<ConsentUpdate, ProviderError> {
        Ok(ConsentUpdate {
            status: ConsentStatus::Obtained,
            is_privacy_options_required: false,
            user_location: "EEA".to_string(),
        })
    }

    fn show_form(&self) -> Result<FormResult, ProviderError> {
        Ok(FormResult {
            shown: false,
            status: ConsentStatus::Obtained,
        })
    }

    fn show_privacy_options_form(&self) -> Result<PrivacyOptionsResult, ProviderError> {
        Ok(PrivacyOptionsResult {
            success: true,
            status: ConsentStatus::Obtained,
        })
    }
}

struct NullSdk;

impl AdSdk for NullSdk {
    fn load(&self, _request: &LoadRequest) -> Result<(), ProviderError> {
        Ok(())
    }

    fn show(&self, _surface: AdSurface, _generation: u64) -> Result<(), ProviderError> {
        Ok(())
    }
}

struct Wifi;

impl ConnectivitySource for Wifi {
    fn fetch(&self) -> Result<ConnectivitySnapshot, ProviderError> {
        Ok(ConnectivitySnapshot::wifi(90))
    }

    fn subscribe(&self, _callback: ConnectivityCallback) -> Result<(), ProviderError> {
        Ok(())
    }
}

fn loaded_engine() -> AdGateEngine {
    let engine = AdGateEngine::new(
        AdGateConfig::default(),
        Collaborators {
            consent_provider: Arc::new(GrantedConsent),
            ad_sdk: Arc::new(NullSdk),
            store: Arc::new(MemoryStore::new()),
            clock: Arc::new(ManualClock::at_epoch_millis(1_700_000_000_000)),
        },
    );
    engine.start(&Wifi);

    let coordinator = engine.coordinator();
    let interstitial = &coordinator.gates().interstitial;
    interstitial.handle_event(AdEvent::new(interstitial.generation(), AdEventKind::Loaded));
    coordinator.on_user_interaction();

    // Fill the connection history so the flapping scan does real work.
    for strength in 0..40u8 {
        coordinator
            .gates()
            .network
            .handle_change(ConnectivitySnapshot::wifi(60 + strength % 30));
    }
    engine
}

fn bench_can_show_now(c: &mut Criterion) {
    let engine = loaded_engine();
    c.bench_function("can_show_now_allow", |b| {
        b.iter(|| black_box(engine.coordinator().can_show_now()))
    });

    let coordinator = engine.coordinator();
    coordinator.gates().network.handle_change(ConnectivitySnapshot::disconnected());
    c.bench_function("can_show_now_network_deny", |b| {
        b.iter(|| black_box(coordinator.can_show_now()))
    });
}

fn bench_suitability(c: &mut Criterion) {
    let engine = loaded_engine();
    let network = engine.coordinator().gates().network.clone();
    c.bench_function("is_network_suitable_for_ads", |b| {
        b.iter(|| black_box(network.is_network_suitable_for_ads()))
    });
}

criterion_group!(benches, bench_can_show_now, bench_suitability);
criterion_main!(benches);
