//! Prompt assembly for the generation step. The template is Dutch and
//! mandates source citations, explicit uncertainty, and refusal when the
//! retrieved context is insufficient.

use helpdesk_models::api::RelationshipChain;

const MAX_PROMPT_RELATIONSHIPS: usize = 5;

pub fn generate_rag_prompt(
    query: &str,
    context: &str,
    relationships: &[RelationshipChain],
) -> String {
    let mut prompt = format!(
        "Je bent een AI-assistent voor het IT-ticketportaal. Je helpt medewerkers met het \
         oplossen van IT-problemen door relevante informatie uit eerdere tickets en \
         kennisbank artikelen te gebruiken.\n\
         \n\
         VRAAG VAN GEBRUIKER:\n\
         {query}\n\
         \n\
         RELEVANTE INFORMATIE UIT TICKETPORTAAL:\n\
         {context}\n\
         \n\
         RELATIES IN KENNISBANK:\n"
    );

    if relationships.is_empty() {
        prompt.push_str("Geen directe relaties gevonden.\n");
    } else {
        for rel in relationships.iter().take(MAX_PROMPT_RELATIONSHIPS) {
            prompt.push_str(&format!(
                "- {} {} {} (vertrouwen: {:.2})\n",
                rel.source, rel.relationship, rel.target, rel.confidence
            ));
        }
    }

    prompt.push_str(
        "\n\
         INSTRUCTIES:\n\
         1. Beantwoord de vraag op basis van de gegeven informatie\n\
         2. Verwijs naar specifieke bronnen (bijv. \"Volgens Ticket T-2024-001...\")\n\
         3. Als je onzeker bent, geef dit duidelijk aan\n\
         4. Als de informatie niet voldoende is, zeg dit eerlijk\n\
         5. Geef praktische, uitvoerbare adviezen\n\
         6. Gebruik Nederlandse taal\n\
         7. Wees beknopt maar compleet\n\
         \n\
         ANTWOORD:\n",
    );

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_sections() {
        let prompt = generate_rag_prompt("laptop start niet", "[Bron 1] Ticket T-1: Laptop", &[]);

        assert!(prompt.contains("VRAAG VAN GEBRUIKER:\nlaptop start niet"));
        assert!(prompt.contains("[Bron 1] Ticket T-1: Laptop"));
        assert!(prompt.contains("Geen directe relaties gevonden."));
        assert!(prompt.contains("Gebruik Nederlandse taal"));
        assert!(prompt.trim_end().ends_with("ANTWOORD:"));
    }

    #[test]
    fn test_relationships_are_capped_at_five() {
        let relationships: Vec<RelationshipChain> = (0..8)
            .map(|i| RelationshipChain {
                source: format!("ticket_{}", i),
                target: "kb_1".to_string(),
                relationship: "RESOLVED_BY".to_string(),
                confidence: 0.7,
            })
            .collect();

        let prompt = generate_rag_prompt("vraag", "context", &relationships);
        let bullet_count = prompt.lines().filter(|l| l.starts_with("- ")).count();
        assert_eq!(bullet_count, 5);
        assert!(prompt.contains("- ticket_0 RESOLVED_BY kb_1 (vertrouwen: 0.70)"));
    }
}
