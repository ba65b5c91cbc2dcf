use std::sync::{Arc, LazyLock};

use regex::Regex;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::warn;

use crate::domain::call_record::CallState;
use crate::domain::negotiation::CallResultKind;
use crate::ports::{CallStatusReport, ReasoningRequest, ReasoningService, ReasoningTask};
use crate::ranking::Insight;

static PRICE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:₹|\brs\.?|\binr|\$|\busd|€)\s*(\d[\d,]*(?:\.\d+)?)|(\d[\d,]*(?:\.\d+)?)\s*(?:rupees|dollars|euros|inr\b|rs\b|usd\b)",
    )
    .expect("price pattern is valid")
});

const EXTRACTOR_SYSTEM: &str = "You read transcripts of price negotiation calls. \
Reply with a single JSON object and nothing else.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallInterpretation {
    pub kind: CallResultKind,
    pub quoted_price: Option<Decimal>,
    pub negotiated_price: Option<Decimal>,
    pub summary: String,
    pub question: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ExtractionReply {
    quoted_price: Option<f64>,
    negotiated_price: Option<f64>,
    summary: Option<String>,
}

/// Turns a finished call into an outcome the workflow can branch on.
#[derive(Clone)]
pub struct CallInterpreter {
    reasoning: Arc<dyn ReasoningService>,
}

impl CallInterpreter {
    pub fn new(reasoning: Arc<dyn ReasoningService>) -> Self {
        Self { reasoning }
    }

    pub async fn interpret(
        &self,
        vendor_name: &str,
        report: &CallStatusReport,
    ) -> Insight<CallInterpretation> {
        let summary = report.summary.clone().unwrap_or_default();

        if report.status == CallState::Failed {
            let reason = report.ended_reason.clone().unwrap_or_else(|| "call failed".to_string());
            return Insight::direct(CallInterpretation {
                kind: CallResultKind::Failed,
                quoted_price: None,
                negotiated_price: None,
                summary: if summary.is_empty() { reason } else { summary },
                question: None,
            });
        }

        if let Some(question) = report.open_question.as_deref().map(str::trim) {
            if !question.is_empty() {
                return Insight::direct(CallInterpretation {
                    kind: CallResultKind::NeedsInput,
                    quoted_price: None,
                    negotiated_price: None,
                    summary,
                    question: Some(question.to_string()),
                });
            }
        }

        let text = [report.transcript.as_deref(), report.summary.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join("\n");
        if text.trim().is_empty() {
            return Insight::direct(classify(None, None, summary_or(summary, vendor_name)));
        }

        let prompt = format!(
            "Call with {vendor_name}.\nTranscript:\n{text}\n\n\
             Respond as {{\"quoted_price\": number|null, \"negotiated_price\": number|null, \
             \"summary\": string}} where quoted_price is the vendor's first offer and \
             negotiated_price the final agreed price."
        );
        let request =
            ReasoningRequest::new(ReasoningTask::PriceExtraction, EXTRACTOR_SYSTEM, prompt);

        let reason = match self.reasoning.invoke(request).await {
            Ok(reply) => match crate::ranking::parse_json_reply::<ExtractionReply>(&reply) {
                Ok(parsed) => {
                    let quoted = parsed.quoted_price.and_then(crate::ranking::decimal_from);
                    let negotiated = parsed.negotiated_price.and_then(crate::ranking::decimal_from);
                    let summary = parsed
                        .summary
                        .filter(|text| !text.trim().is_empty())
                        .unwrap_or_else(|| summary_or(summary.clone(), vendor_name));
                    return Insight::direct(classify(quoted, negotiated, summary));
                }
                Err(reason) => reason,
            },
            Err(error) => error.to_string(),
        };

        warn!(
            event_name = "workflow.call.price_extraction_fallback",
            vendor = %vendor_name,
            reason = %reason,
            "extracting prices from transcript with pattern matching"
        );
        let amounts = extract_amounts(&text);
        let interpretation = classify(
            amounts.first().copied(),
            amounts.last().copied(),
            summary_or(summary, vendor_name),
        );
        Insight::degraded(interpretation, reason)
    }
}

fn summary_or(summary: String, vendor_name: &str) -> String {
    if summary.trim().is_empty() {
        format!("Call with {vendor_name} finished")
    } else {
        summary
    }
}

/// A negotiated price only counts when it beats the quote.
fn classify(
    quoted: Option<Decimal>,
    negotiated: Option<Decimal>,
    summary: String,
) -> CallInterpretation {
    let quoted = quoted.filter(|price| *price > Decimal::ZERO);
    let negotiated = negotiated.filter(|price| *price > Decimal::ZERO);
    let (quoted, negotiated) = match (quoted, negotiated) {
        (Some(quoted), Some(negotiated)) if negotiated < quoted => (Some(quoted), Some(negotiated)),
        (Some(quoted), _) => (Some(quoted), None),
        (None, Some(negotiated)) => (Some(negotiated), None),
        (None, None) => (None, None),
    };

    CallInterpretation {
        kind: if quoted.is_some() { CallResultKind::Quoted } else { CallResultKind::NoQuote },
        quoted_price: quoted,
        negotiated_price: negotiated,
        summary,
        question: None,
    }
}

/// Every currency-marked amount in `text`, in order of appearance.
pub fn extract_amounts(text: &str) -> Vec<Decimal> {
    PRICE_PATTERN
        .captures_iter(text)
        .filter_map(|captures| captures.get(1).or_else(|| captures.get(2)))
        .filter_map(|amount| amount.as_str().replace(',', "").parse::<Decimal>().ok())
        .collect()
}
