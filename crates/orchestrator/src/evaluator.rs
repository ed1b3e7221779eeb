use lazy_static::lazy_static;
use regex::Regex;

use crate::models::message::Message;
use crate::prompt::evaluation_prompt;
use crate::providers::base::Provider;

/// Score used whenever the model's self-evaluation cannot be obtained
pub const NEUTRAL_SCORE: f32 = 0.5;

const EVALUATOR_SYSTEM: &str = "You are a strict reviewer of assistant answers. You reply with a single number.";

lazy_static! {
    static ref LEADING_NUMBER: Regex = Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)").unwrap();
}

/// Asks the model to grade a candidate answer between 0.0 and 1.0
pub struct QualityEvaluator<'a> {
    provider: &'a dyn Provider,
}

impl<'a> QualityEvaluator<'a> {
    pub fn new(provider: &'a dyn Provider) -> Self {
        Self { provider }
    }

    /// Never fails: any error along the way yields the neutral score
    pub async fn evaluate(&self, response: &str, prompt: &str) -> f32 {
        let request = match evaluation_prompt(response, prompt) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("could not render evaluation prompt: {}", e);
                return NEUTRAL_SCORE;
            }
        };

        let messages = [Message::user().with_text(request)];
        match self.provider.complete(EVALUATOR_SYSTEM, &messages, &[]).await {
            Ok((reply, _)) => parse_score(&reply.text()).unwrap_or_else(|| {
                tracing::debug!(reply = %reply.text(), "unparseable quality score");
                NEUTRAL_SCORE
            }),
            Err(e) => {
                tracing::warn!("quality evaluation failed: {}", e);
                NEUTRAL_SCORE
            }
        }
    }
}

/// Leading number of the reply, clamped to [0, 1]
pub fn parse_score(text: &str) -> Option<f32> {
    let number = LEADING_NUMBER.find(text.trim())?;
    let score: f32 = number.as_str().parse().ok()?;
    Some(score.clamp(0.0, 1.0))
}
