//! HTTP-agnostic analysis runs.
//!
//! One run fans out over tickers, and within a ticker over the selected
//! analysts. Provider failures and timeouts are recorded per ticker and never
//! abort sibling work.

use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::Instrument;

use crate::aggregate::DecisionAggregator;
use crate::analysts::{AnalystKey, AnalystRegistry, EvaluationInput};
use crate::config::Settings;
use crate::domain::request::{AnalysisRequest, AnalysisRequestBody};
use crate::domain::response::{
    AnalysisResponse, ProviderFailure, TickerReport, PORTFOLIO_AGENT, RISK_AGENT,
};
use crate::domain::signal::AnalystSignal;
use crate::error::{AnalysisError, ProviderError};
use crate::llm::LlmRouter;
use crate::market::{ChartPriceSource, PriceBar, PriceSource, PriceSummary};
use crate::progress::{LogLevel, ProgressSink, TracingProgress};
use crate::risk::RiskManager;

#[derive(Clone)]
pub struct AnalysisEngine {
    registry: Arc<AnalystRegistry>,
    prices: Arc<dyn PriceSource>,
    risk: RiskManager,
    aggregator: DecisionAggregator,
    limiter: Arc<Semaphore>,
    progress: Arc<dyn ProgressSink>,
}

impl AnalysisEngine {
    pub fn new(registry: AnalystRegistry, prices: Arc<dyn PriceSource>, settings: &Settings) -> Self {
        Self {
            registry: Arc::new(registry),
            prices,
            risk: RiskManager::new(settings.position_limit_fraction),
            aggregator: DecisionAggregator::new(settings.quantity_scaling),
            limiter: Arc::new(Semaphore::new(settings.max_concurrency.max(1))),
            progress: Arc::new(TracingProgress),
        }
    }

    /// LLM-backed analysts for the whole catalog over the HTTP chart source.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let llm = Arc::new(LlmRouter::from_settings(settings)?);
        let registry = AnalystRegistry::with_llm_analysts(llm, settings.analyst_timeout);
        let prices = Arc::new(ChartPriceSource::from_settings(settings)?);
        Ok(Self::new(registry, prices, settings))
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn registry(&self) -> &AnalystRegistry {
        &self.registry
    }

    /// Validates a raw request body and runs it.
    pub async fn analyze(&self, body: AnalysisRequestBody) -> Result<AnalysisResponse, AnalysisError> {
        let today = chrono::Local::now().date_naive();
        let request = body.validate(today)?;
        self.progress.log(
            LogLevel::Info,
            &format!("Starting analysis for {:?}", request.tickers),
        );
        let reports = self.run(&request).await?;
        self.progress
            .log(LogLevel::Success, "Analysis completed successfully");
        Ok(AnalysisResponse::from(reports))
    }

    /// One report per requested ticker, in request order.
    pub async fn run(&self, request: &AnalysisRequest) -> Result<Vec<TickerReport>, AnalysisError> {
        let run_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!(
            "analysis_run",
            %run_id,
            model = %request.model_name,
            tickers = request.tickers.len(),
            analysts = request.analysts.len(),
        );

        async {
            tracing::info!(start = %request.range.start, end = %request.range.end, "analysis run started");

            let reports = join_all(
                request
                    .tickers
                    .iter()
                    .map(|ticker| self.analyze_ticker(request, ticker)),
            )
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;

            let failed: usize = reports.iter().map(|r| r.failures.len()).sum();
            tracing::info!(failed, "analysis run finished");
            Ok::<_, AnalysisError>(reports)
        }
        .instrument(span)
        .await
    }

    async fn analyze_ticker(
        &self,
        request: &AnalysisRequest,
        ticker: &str,
    ) -> Result<TickerReport, AnalysisError> {
        let mut failures = Vec::new();

        self.progress
            .update_status(RISK_AGENT, Some(ticker), "Fetching price data");
        let (bars, priced) = match self.fetch_prices(request, ticker).await {
            Ok(bars) => (bars, true),
            Err(err) => {
                tracing::warn!(%ticker, source = self.prices.source_name(), error = %err, "price fetch failed");
                self.progress
                    .update_status(RISK_AGENT, Some(ticker), &format!("Failed: {err}"));
                failures.push(ProviderFailure {
                    source: self.prices.source_name().to_string(),
                    reason: err.to_string(),
                });
                (Vec::new(), false)
            }
        };
        let summary = PriceSummary::from_bars(&bars);

        let input = EvaluationInput {
            ticker: ticker.to_string(),
            start_date: request.range.start,
            end_date: request.range.end,
            model_name: request.model_name.clone(),
            market: summary.clone(),
        };

        let outcomes = join_all(
            request
                .analysts
                .iter()
                .map(|key| self.evaluate(*key, &input)),
        )
        .await;

        let mut signals = BTreeMap::new();
        for (key, outcome) in request.analysts.iter().zip(outcomes) {
            match outcome? {
                Ok(signal) => {
                    self.progress
                        .update_status(&key.agent_name(), Some(ticker), "Done");
                    signals.insert(*key, signal);
                }
                Err(err) => {
                    tracing::warn!(%ticker, analyst = %key, error = %err, "analyst failed; omitting signal");
                    self.progress
                        .update_status(&key.agent_name(), Some(ticker), &format!("Failed: {err}"));
                    failures.push(ProviderFailure {
                        source: key.agent_name(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        let price = summary.as_ref().map(|s| s.last_close).unwrap_or(0.0);
        let risk = self.risk.assess(ticker, price, &request.portfolio);
        if priced {
            self.progress.update_status(RISK_AGENT, Some(ticker), "Done");
        }

        self.progress
            .update_status(PORTFOLIO_AGENT, Some(ticker), "Making trading decision");
        let decision = self.aggregator.decide(ticker, &signals, &risk);
        tracing::info!(
            %ticker,
            action = %decision.action,
            quantity = decision.quantity,
            confidence = decision.confidence,
            signals = signals.len(),
            "decision made"
        );
        self.progress.update_status(PORTFOLIO_AGENT, Some(ticker), "Done");

        Ok(TickerReport {
            ticker: ticker.to_string(),
            signals,
            failures,
            risk,
            decision,
        })
    }

    async fn fetch_prices(
        &self,
        request: &AnalysisRequest,
        ticker: &str,
    ) -> Result<Vec<PriceBar>, ProviderError> {
        let timeout = self.prices.timeout();
        tokio::time::timeout(
            timeout,
            self.prices
                .daily_bars(ticker, request.range.start, request.range.end),
        )
        .await
        .unwrap_or(Err(ProviderError::Timeout(timeout)))
    }

    /// The outer error is fatal to the run; the inner one is this analyst's failure.
    async fn evaluate(
        &self,
        key: AnalystKey,
        input: &EvaluationInput,
    ) -> Result<Result<AnalystSignal, ProviderError>, AnalysisError> {
        let Some(provider) = self.registry.get(key) else {
            return Ok(Err(ProviderError::ModelInvocation(anyhow::anyhow!(
                "no provider registered for {key}"
            ))));
        };

        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|e| AnalysisError::Internal(anyhow::anyhow!("analyst limiter closed: {e}")))?;

        self.progress
            .update_status(&key.agent_name(), Some(&input.ticker), "Analyzing");

        let timeout = provider.timeout();
        let outcome = match tokio::time::timeout(timeout, provider.evaluate(input)).await {
            Ok(Ok(mut signal)) => {
                // Providers cannot rebind a signal to another analyst or ticker.
                signal.analyst = key;
                signal.ticker = input.ticker.clone();
                Ok(signal)
            }
            Ok(Err(err)) => Err(err),
            Err(_) => Err(ProviderError::Timeout(timeout)),
        };
        Ok(outcome)
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        self.progress.log(level, message);
    }
}

impl std::fmt::Debug for AnalysisEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisEngine")
            .field("registry", &self.registry)
            .field("prices", &self.prices.source_name())
            .field("risk", &self.risk)
            .field("aggregator", &self.aggregator)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysts::SignalProvider;
    use crate::domain::decision::Action;
    use crate::domain::signal::Signal;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    enum Behavior {
        Signal(Signal, f64),
        Fail,
        Hang,
    }

    struct Stub {
        key: AnalystKey,
        behavior: Behavior,
    }

    #[async_trait::async_trait]
    impl SignalProvider for Stub {
        fn key(&self) -> AnalystKey {
            self.key
        }

        fn timeout(&self) -> Duration {
            Duration::from_millis(50)
        }

        async fn evaluate(&self, input: &EvaluationInput) -> Result<AnalystSignal, ProviderError> {
            match self.behavior {
                Behavior::Signal(signal, confidence) => Ok(AnalystSignal::new(
                    self.key,
                    &input.ticker,
                    signal,
                    confidence,
                    format!("{} on {}", self.key, input.ticker),
                )),
                Behavior::Fail => Err(ProviderError::data_unavailable(&input.ticker, "no financials")),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Err(ProviderError::data_unavailable(&input.ticker, "unreachable"))
                }
            }
        }
    }

    struct FixedPrices {
        close: Option<f64>,
    }

    #[async_trait::async_trait]
    impl PriceSource for FixedPrices {
        fn source_name(&self) -> &'static str {
            "fixed"
        }

        fn timeout(&self) -> Duration {
            Duration::from_millis(50)
        }

        async fn daily_bars(
            &self,
            ticker: &str,
            _start: NaiveDate,
            end: NaiveDate,
        ) -> Result<Vec<PriceBar>, ProviderError> {
            match self.close {
                Some(close) => Ok(vec![PriceBar {
                    date: end,
                    open: None,
                    high: None,
                    low: None,
                    close,
                    volume: None,
                }]),
                None => Err(ProviderError::data_unavailable(ticker, "delisted")),
            }
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl ProgressSink for Recorder {
        fn log(&self, _level: LogLevel, message: &str) {
            self.0.lock().unwrap().push(message.to_string());
        }
    }

    fn engine(providers: Vec<(AnalystKey, Behavior)>, close: Option<f64>) -> AnalysisEngine {
        let mut registry = AnalystRegistry::new();
        for (key, behavior) in providers {
            registry.register(Arc::new(Stub { key, behavior }));
        }
        AnalysisEngine::new(registry, Arc::new(FixedPrices { close }), &Settings::default())
    }

    fn request(tickers: &str, analysts: serde_json::Value) -> AnalysisRequest {
        let body: AnalysisRequestBody = serde_json::from_value(serde_json::json!({
            "tickers": tickers,
            "selectedAnalysts": analysts,
            "modelName": "gpt-4o",
            "startDate": "2024-01-01",
            "endDate": "2024-03-01",
        }))
        .unwrap();
        body.validate(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn single_bearish_analyst_shorts_tsla() {
        let engine = engine(
            vec![(AnalystKey::BenGraham, Behavior::Signal(Signal::Bearish, 80.0))],
            Some(236.26),
        );
        let reports = engine
            .run(&request("TSLA", serde_json::json!(["ben_graham"])))
            .await
            .unwrap();

        assert_eq!(reports.len(), 1);
        let r = &reports[0];
        assert_eq!(r.risk.remaining_limit, 20_000.0);
        assert_eq!(r.decision.action, Action::Short);
        assert_eq!(r.decision.confidence, 80.0);
        assert_eq!(r.decision.quantity, 67);
        assert!(r.failures.is_empty());
    }

    #[tokio::test]
    async fn failures_and_timeouts_are_omitted_without_affecting_siblings() {
        let engine = engine(
            vec![
                (AnalystKey::BenGraham, Behavior::Signal(Signal::Bullish, 60.0)),
                (AnalystKey::Wsb, Behavior::Fail),
                (AnalystKey::NancyPelosi, Behavior::Hang),
            ],
            Some(100.0),
        );
        let reports = engine
            .run(&request(
                "AAPL,MSFT",
                serde_json::json!(["ben_graham", "wsb", "nancy_pelosi"]),
            ))
            .await
            .unwrap();

        assert_eq!(
            reports.iter().map(|r| r.ticker.as_str()).collect::<Vec<_>>(),
            vec!["AAPL", "MSFT"]
        );
        for r in &reports {
            assert_eq!(r.signals.keys().copied().collect::<Vec<_>>(), vec![AnalystKey::BenGraham]);
            assert_eq!(r.failures.len(), 2);
            assert!(r.failures.iter().any(|f| f.source == "nancy_pelosi_agent"
                && f.reason.starts_with("timed out")));
            assert_eq!(r.decision.action, Action::Buy);
            assert_eq!(r.decision.quantity, 120);
        }
    }

    #[tokio::test]
    async fn all_analysts_failing_holds_at_zero_confidence() {
        let engine = engine(
            vec![(AnalystKey::Wsb, Behavior::Fail), (AnalystKey::BenGraham, Behavior::Hang)],
            Some(100.0),
        );
        let reports = engine
            .run(&request("GME", serde_json::json!(["wsb", "ben_graham"])))
            .await
            .unwrap();

        let d = &reports[0].decision;
        assert_eq!(d.action, Action::Hold);
        assert_eq!(d.confidence, 0.0);
        assert_eq!(d.quantity, 0);
        assert!(reports[0].signals.is_empty());
    }

    #[tokio::test]
    async fn empty_selection_runs_the_whole_catalog() {
        let providers = AnalystKey::ALL
            .into_iter()
            .map(|k| (k, Behavior::Signal(Signal::Neutral, 40.0)))
            .collect();
        let engine = engine(providers, Some(50.0));
        let reports = engine
            .run(&request("SPY", serde_json::json!([])))
            .await
            .unwrap();

        assert_eq!(reports[0].signals.len(), 9);
        assert_eq!(reports[0].decision.action, Action::Hold);
        assert_eq!(reports[0].decision.confidence, 40.0);
    }

    #[tokio::test]
    async fn missing_price_data_still_decides_with_zero_quantity() {
        let engine = engine(
            vec![(AnalystKey::TechnicalAnalyst, Behavior::Signal(Signal::Bullish, 90.0))],
            None,
        );
        let reports = engine
            .run(&request("XYZ", serde_json::json!(["technical_analyst"])))
            .await
            .unwrap();

        let r = &reports[0];
        assert_eq!(r.risk.current_price, 0.0);
        assert_eq!(r.risk.remaining_limit, 0.0);
        assert_eq!(r.decision.action, Action::Buy);
        assert_eq!(r.decision.quantity, 0);
        assert_eq!(r.failures[0].source, "fixed");
    }

    #[tokio::test]
    async fn failed_price_fetch_never_reports_risk_done() {
        let recorder = Arc::new(Recorder::default());
        let engine = engine(
            vec![(AnalystKey::Wsb, Behavior::Signal(Signal::Bullish, 90.0))],
            None,
        )
        .with_progress(recorder.clone());
        engine
            .run(&request("XYZ", serde_json::json!(["wsb"])))
            .await
            .unwrap();

        let logs = recorder.0.lock().unwrap();
        assert!(logs
            .iter()
            .any(|l| l.starts_with("[risk_management_agent] XYZ: Failed")));
        assert!(!logs.contains(&"[risk_management_agent] XYZ: Done".to_string()));
    }

    struct Counting {
        key: AnalystKey,
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl SignalProvider for Counting {
        fn key(&self) -> AnalystKey {
            self.key
        }

        fn timeout(&self) -> Duration {
            Duration::from_secs(5)
        }

        async fn evaluate(&self, input: &EvaluationInput) -> Result<AnalystSignal, ProviderError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(AnalystSignal::new(self.key, &input.ticker, Signal::Neutral, 50.0, "counted"))
        }
    }

    #[tokio::test]
    async fn in_flight_provider_calls_are_bounded() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut registry = AnalystRegistry::new();
        for key in AnalystKey::ALL {
            registry.register(Arc::new(Counting {
                key,
                in_flight: in_flight.clone(),
                peak: peak.clone(),
            }));
        }
        let settings = Settings {
            max_concurrency: 2,
            ..Default::default()
        };
        let engine = AnalysisEngine::new(registry, Arc::new(FixedPrices { close: Some(10.0) }), &settings);

        let reports = engine
            .run(&request("AAPL,MSFT,NVDA", serde_json::json!([])))
            .await
            .unwrap();

        assert!(reports.iter().all(|r| r.signals.len() == 9));
        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unregistered_analyst_is_a_failure_not_an_error() {
        let engine = engine(vec![], Some(100.0));
        let reports = engine
            .run(&request("TSLA", serde_json::json!(["valuation_analyst"])))
            .await
            .unwrap();
        assert!(reports[0].signals.is_empty());
        assert_eq!(reports[0].failures.len(), 1);
        assert_eq!(reports[0].decision.action, Action::Hold);
    }

    #[tokio::test]
    async fn reports_progress_per_agent_and_ticker() {
        let recorder = Arc::new(Recorder::default());
        let engine = engine(
            vec![(AnalystKey::Wsb, Behavior::Signal(Signal::Bullish, 70.0))],
            Some(20.0),
        )
        .with_progress(recorder.clone());

        let response = engine
            .analyze(
                serde_json::from_value(serde_json::json!({
                    "tickers": ["GME"],
                    "selectedAnalysts": ["wsb"],
                    "modelName": "gpt-4o",
                }))
                .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.decisions["GME"].action, Action::Buy);

        let logs = recorder.0.lock().unwrap();
        assert!(logs.contains(&"[wsb_agent] GME: Done".to_string()));
        assert!(logs.contains(&"[portfolio_management_agent] GME: Done".to_string()));
        assert_eq!(logs.first().map(String::as_str), Some("Starting analysis for [\"GME\"]"));
        assert_eq!(logs.last().map(String::as_str), Some("Analysis completed successfully"));
    }
}
