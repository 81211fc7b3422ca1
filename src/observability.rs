use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("converso.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("converso.client.request_errors");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("converso.client.request_duration_seconds");

pub(crate) static SESSION_COMPLETIONS: Counter = Counter::new("converso.session.completions");
pub(crate) static SESSION_ROLLBACKS: Counter = Counter::new("converso.session.rollbacks");
pub(crate) static SESSION_BUSY_REJECTIONS: Counter =
    Counter::new("converso.session.busy_rejections");

pub(crate) static LEDGER_TOKENS: Counter = Counter::new("converso.ledger.tokens");
pub(crate) static LEDGER_WRITES: Counter = Counter::new("converso.ledger.writes");
pub(crate) static LEDGER_WRITE_ERRORS: Counter = Counter::new("converso.ledger.write_errors");
pub(crate) static LEDGER_LOAD_ERRORS: Counter = Counter::new("converso.ledger.load_errors");

pub(crate) static VOICE_UTTERANCES: Counter = Counter::new("converso.voice.utterances");
pub(crate) static VOICE_INTERRUPTIONS: Counter = Counter::new("converso.voice.interruptions");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_moments(&CLIENT_REQUEST_DURATION);

    collector.register_counter(&SESSION_COMPLETIONS);
    collector.register_counter(&SESSION_ROLLBACKS);
    collector.register_counter(&SESSION_BUSY_REJECTIONS);

    collector.register_counter(&LEDGER_TOKENS);
    collector.register_counter(&LEDGER_WRITES);
    collector.register_counter(&LEDGER_WRITE_ERRORS);
    collector.register_counter(&LEDGER_LOAD_ERRORS);

    collector.register_counter(&VOICE_UTTERANCES);
    collector.register_counter(&VOICE_INTERRUPTIONS);
}
