//! Enrichment pipeline — attaches a category and a suggested reply to every
//! email that does not have them yet.
//!
//! For each unenriched email, one classify call and one reply call are
//! issued concurrently, keyed by the subject line. Emails are processed
//! concurrently up to a semaphore limit and results are matched back by
//! position. Individual call failures are replaced with fallback strings;
//! a pass never fails as a whole.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::api::MailApi;
use crate::model::{Email, Enrichment};

/// Category used when classification fails or returns nothing.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Reply used when reply generation fails.
pub const REPLY_FALLBACK: &str = "Error generating reply";

/// Default number of emails enriched at once.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Runs classify/reply calls for unenriched emails with bounded concurrency.
pub struct Enricher {
    api: Arc<dyn MailApi>,
    permits: Arc<Semaphore>,
    concurrency: usize,
}

impl Enricher {
    pub fn new(api: Arc<dyn MailApi>, concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            api,
            permits: Arc::new(Semaphore::new(concurrency)),
            concurrency,
        }
    }

    /// Enrich every email in `emails` whose category is not set yet.
    ///
    /// Returns the enrichment produced this pass, keyed by position in
    /// `emails`. Already-enriched emails cost no calls and are not listed.
    pub async fn enrich(&self, emails: &[Email]) -> Vec<(usize, Enrichment)> {
        let dispatched: Vec<usize> = emails
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.is_enriched())
            .map(|(i, _)| i)
            .collect();

        if dispatched.is_empty() {
            debug!(total = emails.len(), "Nothing to enrich");
            return Vec::new();
        }

        info!(
            pending = dispatched.len(),
            total = emails.len(),
            concurrency = self.concurrency,
            "Enriching emails"
        );

        let futures: Vec<_> = dispatched
            .iter()
            .map(|&idx| self.enrich_one(&emails[idx].subject))
            .collect();
        let results = join_all(futures).await;

        dispatched.into_iter().zip(results).collect()
    }

    /// Classify and generate a reply for one email text, both at once.
    async fn enrich_one(&self, email_text: &str) -> Enrichment {
        // Never closed; acquire cannot fail.
        let _permit = self.permits.acquire().await.ok();

        let (category, reply) = tokio::join!(
            self.classify_or_fallback(email_text),
            self.reply_or_fallback(email_text)
        );
        Enrichment { category, reply }
    }

    async fn classify_or_fallback(&self, email_text: &str) -> String {
        match self.api.classify(email_text).await {
            Ok(Some(label)) if !label.is_empty() => label,
            Ok(_) => UNCATEGORIZED.to_string(),
            Err(e) => {
                warn!(subject = %email_text, error = %e, "Classification failed");
                UNCATEGORIZED.to_string()
            }
        }
    }

    async fn reply_or_fallback(&self, email_text: &str) -> String {
        match self.api.generate_reply(email_text).await {
            Ok(reply) => reply.unwrap_or_default(),
            Err(e) => {
                warn!(subject = %email_text, error = %e, "Reply generation failed");
                REPLY_FALLBACK.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::error::ApiError;
    use crate::model::SearchFilters;

    /// Scripted backend: per-subject outcomes, call counters.
    #[derive(Default)]
    struct ScriptedApi {
        classify: HashMap<String, Result<Option<String>, u16>>,
        replies: HashMap<String, Result<Option<String>, u16>>,
        classify_calls: Mutex<Vec<String>>,
        reply_calls: Mutex<Vec<String>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedApi {
        fn outcome(
            table: &HashMap<String, Result<Option<String>, u16>>,
            endpoint: &str,
            text: &str,
        ) -> Result<Option<String>, ApiError> {
            match table.get(text) {
                Some(Ok(v)) => Ok(v.clone()),
                Some(Err(0)) => Err(ApiError::Request {
                    endpoint: endpoint.into(),
                    reason: "connection refused".into(),
                }),
                Some(Err(status)) => Err(ApiError::Status {
                    endpoint: endpoint.into(),
                    status: *status,
                    body: String::new(),
                }),
                None => Ok(Some(format!("{endpoint}:{text}"))),
            }
        }
    }

    #[async_trait]
    impl MailApi for ScriptedApi {
        async fn search(&self, _filters: &SearchFilters) -> Result<Vec<Email>, ApiError> {
            Ok(Vec::new())
        }

        async fn classify(&self, email_text: &str) -> Result<Option<String>, ApiError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            self.classify_calls.lock().unwrap().push(email_text.to_string());
            Self::outcome(&self.classify, "/classify", email_text)
        }

        async fn generate_reply(&self, email_text: &str) -> Result<Option<String>, ApiError> {
            self.reply_calls.lock().unwrap().push(email_text.to_string());
            Self::outcome(&self.replies, "/generate-reply", email_text)
        }
    }

    fn email(subject: &str) -> Email {
        Email {
            subject: subject.to_string(),
            from: "a@x.com".into(),
            to: "b@x.com".into(),
            date: "2024-01-01T10:00:00Z".into(),
            ..Email::default()
        }
    }

    /// Apply a pass's results the way the session overlay does.
    fn applied(emails: &[Email], results: &[(usize, Enrichment)]) -> Vec<Email> {
        let mut out = emails.to_vec();
        for (idx, enrichment) in results {
            out[*idx] = emails[*idx].with_enrichment(enrichment.clone());
        }
        out
    }

    fn positions(results: &[(usize, Enrichment)]) -> Vec<usize> {
        results.iter().map(|(idx, _)| *idx).collect()
    }

    #[tokio::test]
    async fn one_classify_and_one_reply_per_email() {
        let api = Arc::new(ScriptedApi::default());
        let enricher = Enricher::new(api.clone(), DEFAULT_CONCURRENCY);
        let emails: Vec<Email> = ["a", "b", "c"].iter().map(|s| email(s)).collect();

        let results = enricher.enrich(&emails).await;

        assert_eq!(positions(&results), vec![0, 1, 2]);
        assert_eq!(api.classify_calls.lock().unwrap().len(), 3);
        assert_eq!(api.reply_calls.lock().unwrap().len(), 3);
        for e in applied(&emails, &results) {
            assert_eq!(e.category.as_deref(), Some(format!("/classify:{}", e.subject).as_str()));
            assert_eq!(e.reply.as_deref(), Some(format!("/generate-reply:{}", e.subject).as_str()));
        }
    }

    #[tokio::test]
    async fn classify_failures_fall_back_per_email() {
        let mut api = ScriptedApi::default();
        api.classify.insert("offline".into(), Err(0));
        api.classify.insert("broken".into(), Err(500));
        api.classify.insert("blank".into(), Ok(Some(String::new())));
        let api = Arc::new(api);
        let enricher = Enricher::new(api, 2);

        let emails: Vec<Email> = ["offline", "ok", "broken", "blank"]
            .iter()
            .map(|s| email(s))
            .collect();
        let results = enricher.enrich(&emails).await;

        let categories: Vec<_> = results.into_iter().map(|(_, e)| e.category).collect();
        assert_eq!(
            categories,
            vec![
                UNCATEGORIZED.to_string(),
                "/classify:ok".to_string(),
                UNCATEGORIZED.to_string(),
                UNCATEGORIZED.to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn reply_failures_fall_back() {
        let mut api = ScriptedApi::default();
        api.replies.insert("offline".into(), Err(0));
        api.replies.insert("broken".into(), Err(503));
        api.replies.insert("silent".into(), Ok(None));
        let enricher = Enricher::new(Arc::new(api), 4);

        let emails: Vec<Email> = ["offline", "broken", "silent"]
            .iter()
            .map(|s| email(s))
            .collect();
        let results = enricher.enrich(&emails).await;

        assert_eq!(results[0].1.reply, REPLY_FALLBACK);
        assert_eq!(results[1].1.reply, REPLY_FALLBACK);
        assert_eq!(results[2].1.reply, "");
    }

    #[tokio::test]
    async fn already_enriched_emails_are_skipped() {
        let api = Arc::new(ScriptedApi::default());
        let enricher = Enricher::new(api.clone(), DEFAULT_CONCURRENCY);
        let emails = [email("a"), email("b")];

        let first = applied(&emails, &enricher.enrich(&emails).await);
        let second = enricher.enrich(&first).await;

        assert!(second.is_empty());
        assert_eq!(api.classify_calls.lock().unwrap().len(), 2);
        assert_eq!(api.reply_calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn mixed_list_only_dispatches_missing() {
        let api = Arc::new(ScriptedApi::default());
        let enricher = Enricher::new(api.clone(), DEFAULT_CONCURRENCY);

        let done = email("done").with_enrichment(Enrichment {
            category: "Spam".into(),
            reply: "no".into(),
        });
        let results = enricher.enrich(&[done, email("fresh")]).await;

        assert_eq!(positions(&results), vec![1]);
        assert_eq!(*api.classify_calls.lock().unwrap(), vec!["fresh".to_string()]);
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let api = Arc::new(ScriptedApi::default());
        let enricher = Enricher::new(api.clone(), 2);
        let emails: Vec<Email> = (0..10).map(|i| email(&format!("m{i}"))).collect();

        let results = enricher.enrich(&emails).await;

        assert_eq!(results.len(), 10);
        assert!(api.max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn zero_concurrency_runs_one_at_a_time() {
        let api = Arc::new(ScriptedApi::default());
        let enricher = Enricher::new(api.clone(), 0);
        let emails: Vec<Email> = (0..4).map(|i| email(&format!("m{i}"))).collect();

        let results = enricher.enrich(&emails).await;

        assert_eq!(results.len(), 4);
        assert_eq!(api.max_in_flight.load(Ordering::SeqCst), 1);
    }
}
