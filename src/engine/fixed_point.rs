use super::Engine;
use crate::error::Result;
use crate::request::FuzzableRequest;
use crate::worklist::WorkList;
use tracing::debug;

impl Engine<'_> {
    /// Alternate discovery and bruteforce until no new credentials are found
    ///
    /// After a successful bruteforce round, discovery restarts from the
    /// cracked request points only. The merged result is registered in the
    /// knowledge base once the loop is over.
    pub async fn discover_and_bruteforce(&mut self, seed: WorkList) -> Result<WorkList> {
        self.session.clear_time_limit();

        let mut result = WorkList::new();
        let mut seed = seed;
        loop {
            let discovered = self.discover(seed).await?;
            if self.session.is_stopped() {
                result.extend(discovered.into_vec());
                break;
            }

            let cracked = self.bruteforce(discovered.as_slice()).await?;
            result.extend(discovered.into_vec());
            result.extend(cracked.iter().cloned());
            if cracked.is_empty() || self.session.is_stopped() {
                break;
            }

            self.use_cracked_credentials();
            seed = WorkList::from_requests(cracked);
        }

        self.session
            .kb()
            .add_urls(result.iter().map(FuzzableRequest::url));
        Ok(result)
    }

    /// Configure the transport with the credentials bruteforce plugins found
    fn use_cracked_credentials(&self) {
        let transport = self.session.transport();
        for credential in self.session.kb().basic_auth_credentials() {
            debug!("Using cracked credentials for {}", credential.url);
            transport.set_basic_auth(&credential.url, &credential.username, &credential.password);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kb::BasicAuthCredential;
    use crate::plugin::{Plugin, PluginTable, PluginType};
    use crate::testing::{CallLog, MockTransport, StubPlugin, get, session_with, url};
    use crate::worklist::Scope;
    use std::sync::Arc;
    use std::time::Duration;

    fn paths(list: &WorkList) -> Vec<String> {
        list.iter()
            .map(|r| match r.url().query() {
                Some(query) => format!("{}?{}", r.url().path(), query),
                None => r.url().path().to_string(),
            })
            .collect()
    }

    #[tokio::test]
    async fn empty_bruteforce_ends_the_loop() {
        let session = session_with(Arc::new(MockTransport::new()));
        session.mark_started();
        let log = CallLog::default();
        let mut table = PluginTable::default();
        table.set(
            PluginType::Discovery,
            vec![Box::new(
                StubPlugin::new(PluginType::Discovery, "spider")
                    .returns("http://a.com/", vec![get("http://a.com/x")])
                    .log_to(&log),
            )],
        );
        table.set(
            PluginType::Bruteforce,
            vec![Box::new(StubPlugin::new(PluginType::Bruteforce, "brute").log_to(&log))],
        );
        let scope = Scope::new([&url("http://a.com/")]);
        let mut engine = Engine::new(&session, &mut table, &scope, Duration::from_secs(600));

        let result = engine
            .discover_and_bruteforce(WorkList::from_requests(vec![get("http://a.com/")]))
            .await
            .unwrap();

        assert_eq!(paths(&result), vec!["/", "/x"]);
        let calls = log.lock().unwrap();
        assert_eq!(calls.iter().filter(|c| c.starts_with("brute:http")).count(), 2);
        assert_eq!(session.kb().urls().len(), 2);
    }

    #[tokio::test]
    async fn cracked_requests_become_the_next_seed() {
        let transport = Arc::new(MockTransport::new());
        let session = session_with(transport.clone());
        session.mark_started();
        let log = CallLog::default();

        let mut table = PluginTable::default();
        let spider = StubPlugin::new(PluginType::Discovery, "spider")
            .returns("http://a.com/", vec![get("http://a.com/admin/")])
            .returns("http://a.com/admin/?auth=1", vec![get("http://a.com/admin/panel")])
            .log_to(&log);
        table.set(PluginType::Discovery, vec![Box::new(spider) as Box<dyn Plugin>]);

        // Cracks /admin/ once, then finds nothing new
        let cracked = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let brute = StubPlugin::new(PluginType::Bruteforce, "basic_auth")
            .on_run(move |request, context| {
                if request.url().path() == "/admin/"
                    && !cracked.swap(true, std::sync::atomic::Ordering::SeqCst)
                    && let Some(context) = context
                {
                    context.kb.add_basic_auth(&BasicAuthCredential {
                        url: request.url().clone(),
                        username: "admin".into(),
                        password: "secret".into(),
                    });
                }
            })
            .returns("http://a.com/admin/", vec![get("http://a.com/admin/?auth=1")])
            .log_to(&log);
        let mut brute: Box<dyn Plugin> = Box::new(brute);
        brute.bind(session.plugin_context());
        table.set(PluginType::Bruteforce, vec![brute]);

        let scope = Scope::new([&url("http://a.com/")]);
        let mut engine = Engine::new(&session, &mut table, &scope, Duration::from_secs(600));

        let result = engine
            .discover_and_bruteforce(WorkList::from_requests(vec![get("http://a.com/")]))
            .await
            .unwrap();

        let calls: Vec<String> = log
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with("spider:http"))
            .cloned()
            .collect();
        // Second discovery round starts from the cracked point only
        assert_eq!(
            calls,
            vec![
                "spider:http://a.com/",
                "spider:http://a.com/admin/",
                "spider:http://a.com/admin/?auth=1",
                "spider:http://a.com/admin/panel",
            ]
        );
        assert_eq!(
            paths(&result),
            vec!["/", "/admin/", "/admin/?auth=1", "/admin/panel"]
        );
        assert_eq!(
            *transport.basic_auth.lock().unwrap(),
            vec![(
                "http://a.com/admin/".to_string(),
                "admin".to_string(),
                "secret".to_string()
            )]
        );
    }
}
