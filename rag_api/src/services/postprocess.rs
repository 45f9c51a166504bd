//! Post-processing of generated answers: uncertainty detection, confidence
//! scoring, and a fallback source listing when the model cited nothing.

use helpdesk_models::api::SourceDocument;

const UNCERTAINTY_PHRASES: [&str; 7] = [
    "ik weet niet",
    "niet zeker",
    "mogelijk",
    "misschien",
    "waarschijnlijk",
    "onvoldoende informatie",
    "niet genoeg informatie",
];

const MAX_LISTED_SOURCES: usize = 5;

/// Scan, score, and annotate a raw answer. Returns the processed answer, the
/// confidence score, and the detected uncertainties.
pub fn post_process(raw_answer: &str, sources: &[SourceDocument]) -> (String, f32, Vec<String>) {
    let mut answer = raw_answer.trim().to_string();

    let answer_lower = answer.to_lowercase();
    let uncertainties: Vec<String> = UNCERTAINTY_PHRASES
        .iter()
        .filter(|phrase| answer_lower.contains(*phrase))
        .map(|phrase| format!("Onzekerheid gedetecteerd: '{}'", phrase))
        .collect();

    let confidence = confidence_score(&answer, sources, uncertainties.len());

    if !sources.is_empty() && !has_citation(&answer, sources) {
        answer.push_str("\n\n**Bronnen:**\n");
        for (i, source) in sources.iter().take(MAX_LISTED_SOURCES).enumerate() {
            match &source.ticket_number {
                Some(number) => {
                    answer.push_str(&format!("{}. Ticket {}: {}\n", i + 1, number, source.title))
                }
                None => answer.push_str(&format!("{}. {}\n", i + 1, source.title)),
            }
        }
    }

    (answer, confidence, uncertainties)
}

fn has_citation(answer: &str, sources: &[SourceDocument]) -> bool {
    sources
        .iter()
        .filter_map(|s| s.ticket_number.as_deref())
        .filter(|number| !number.is_empty())
        .any(|number| answer.contains(number))
}

/// Confidence heuristic: start at 0.8, subtract 0.1 per uncertainty and for
/// very short answers, add 0.1 for a citation and up to 0.1 for strong
/// sources, clamped to [0, 1].
fn confidence_score(answer: &str, sources: &[SourceDocument], uncertainty_count: usize) -> f32 {
    let mut score = 0.8f32;

    score -= uncertainty_count as f32 * 0.1;

    if answer.chars().count() < 100 {
        score -= 0.1;
    }

    if has_citation(answer, sources) {
        score += 0.1;
    }

    if !sources.is_empty() {
        let top = sources.len().min(3);
        let avg: f32 = sources[..top].iter().map(|s| s.score).sum::<f32>() / top as f32;
        score += avg * 0.1;
    }

    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(ticket_number: Option<&str>, score: f32) -> SourceDocument {
        SourceDocument {
            id: "ticket_1_header_0".to_string(),
            title: "Laptop start niet op".to_string(),
            content: String::new(),
            category: None,
            ticket_number: ticket_number.map(|s| s.to_string()),
            score,
            source_type: "tickets".to_string(),
        }
    }

    #[test]
    fn test_uncertainty_detection() {
        let (_, confidence, uncertainties) = post_process(
            "Het is mogelijk een BIOS-probleem, maar ik ben niet zeker. \
             Controleer eerst de voeding en daarna het geheugen van de laptop.",
            &[],
        );

        assert_eq!(uncertainties.len(), 2);
        assert!(uncertainties[0].contains("mogelijk") || uncertainties[1].contains("mogelijk"));
        // 0.8 - 2 * 0.1
        assert!((confidence - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_citation_bonus_and_source_quality() {
        let answer = "Volgens Ticket T-2024-001 lost een BIOS update dit op. \
                      Voer de update uit via de supportpagina van de fabrikant en herstart daarna.";
        let sources = vec![source(Some("T-2024-001"), 0.9)];

        let (processed, confidence, uncertainties) = post_process(answer, &sources);

        assert!(uncertainties.is_empty());
        // 0.8 + 0.1 citation + 0.09 source quality
        assert!((confidence - 0.99).abs() < 1e-6);
        // Citation present: no appended source list.
        assert!(!processed.contains("**Bronnen:**"));
    }

    #[test]
    fn test_sources_appended_without_citation() {
        let answer = "Start de laptop opnieuw op en controleer de voedingskabel voordat \
                      u verdere stappen onderneemt bij dit soort problemen.";
        let sources = vec![
            source(Some("T-2024-001"), 0.9),
            source(None, 0.8),
        ];

        let (processed, _, _) = post_process(answer, &sources);
        assert!(processed.contains("**Bronnen:**"));
        assert!(processed.contains("1. Ticket T-2024-001: Laptop start niet op"));
        assert!(processed.contains("2. Laptop start niet op"));
    }

    #[test]
    fn test_short_answer_penalty_and_clamping() {
        let (_, confidence, _) = post_process("Geen idee.", &[]);
        // 0.8 - 0.1 short; "geen idee" is not an enumerated phrase.
        assert!((confidence - 0.7).abs() < 1e-6);

        let very_uncertain = "ik weet niet; niet zeker; mogelijk; misschien; waarschijnlijk; \
                              onvoldoende informatie; niet genoeg informatie; kortom alles is onduidelijk";
        let (_, clamped, uncertainties) = post_process(very_uncertain, &[]);
        assert_eq!(uncertainties.len(), 7);
        // 0.8 - 7 * 0.1, clamped at the floor.
        assert!((0.0..=0.11).contains(&clamped));
    }
}
