//! Term sets for intent classification and urgency scoring
//!
//! Every list is written in folded form (lowercase, no diacritics) so that
//! "vômito", "Vomito" and "VÔMITO" all hit the same entry. Text is folded
//! with [`fold`] before it is matched.

use regex::Regex;
use std::sync::LazyLock;

/// Vocabulary of one language
#[derive(Debug)]
pub struct Lexicon {
    pub symptom: &'static [&'static str],
    pub scheduling: &'static [&'static str],
    pub emergency: &'static [&'static str],
    pub moderate: &'static [&'static str],
}

pub const PORTUGUESE: Lexicon = Lexicon {
    symptom: &[
        "dor", "dores", "doendo", "doi", "febre", "tosse", "nausea", "enjoo", "vomito",
        "vomitando", "diarreia", "tontura", "tonto", "tonta", "cansaco", "fadiga", "fraqueza",
        "coceira", "mancha", "manchas", "inchaco", "inchado", "inchada", "sangramento",
        "ardencia", "queimacao", "dor de cabeca", "enxaqueca", "garganta", "resfriado", "gripe",
        "sintoma", "sintomas", "mal estar", "mal-estar", "calafrio", "calafrios", "palpitacao",
        "formigamento", "dormencia", "sinto", "sentindo",
    ],
    scheduling: &[
        "agendar", "agendamento", "marcar", "consulta", "horario", "horarios", "remarcar",
        "desmarcar", "agenda", "disponibilidade", "retorno",
    ],
    emergency: &[
        "dor no peito", "dor toracica", "aperto no peito", "pressao no peito", "falta de ar",
        "dificuldade para respirar", "dificuldade de respirar", "nao consigo respirar", "sem ar",
        "desmaio", "desmaiei", "desmaiou", "perdi a consciencia", "perda de consciencia",
        "inconsciente", "convulsao", "boca torta", "fala enrolada", "paralisia", "avc",
        "derrame", "sangramento intenso", "hemorragia", "vomitando sangue", "infarto",
        "suicidio", "me matar", "overdose", "anafilaxia", "labios roxos",
    ],
    moderate: &[
        "febre alta", "febre", "vomito", "vomitando", "diarreia", "sangue", "sangramento",
        "muito forte", "forte", "intensa", "intenso", "insuportavel", "piorando", "piorou",
        "piora", "nao passa", "constante", "tontura", "desidratacao", "rigidez na nuca",
        "confusao", "gravida", "gestante",
    ],
};

pub const ENGLISH: Lexicon = Lexicon {
    symptom: &[
        "pain", "ache", "aching", "hurts", "hurt", "fever", "cough", "nausea", "vomiting",
        "diarrhea", "dizzy", "dizziness", "fatigue", "tired", "weakness", "rash", "itching",
        "swelling", "swollen", "bleeding", "headache", "migraine", "sore throat", "flu",
        "symptom", "symptoms", "chills", "palpitations", "numbness", "tingling", "feeling sick",
    ],
    scheduling: &[
        "schedule", "appointment", "book", "booking", "reschedule", "availability",
        "available slot",
    ],
    emergency: &[
        "chest pain", "chest tightness", "shortness of breath", "can't breathe",
        "cannot breathe", "difficulty breathing", "trouble breathing", "fainted", "passed out",
        "unconscious", "loss of consciousness", "seizure", "stroke", "slurred speech",
        "face drooping", "severe bleeding", "heart attack", "suicidal", "kill myself",
        "overdose", "anaphylaxis",
    ],
    moderate: &[
        "high fever", "fever", "vomiting", "diarrhea", "blood", "bleeding", "severe", "strong",
        "unbearable", "worse", "worsening", "getting worse", "constant", "persistent", "dizzy",
        "dehydrated", "stiff neck", "confused", "pregnant",
    ],
};

pub const LEXICONS: &[&Lexicon] = &[&PORTUGUESE, &ENGLISH];

pub static SYMPTOM_TERMS: LazyLock<TermSet> = LazyLock::new(|| {
    // Emergency vocabulary always describes a symptom
    TermSet::new(
        LEXICONS
            .iter()
            .flat_map(|l| l.symptom.iter().chain(l.emergency.iter()).copied()),
    )
});

pub static SCHEDULING_TERMS: LazyLock<TermSet> =
    LazyLock::new(|| TermSet::new(LEXICONS.iter().flat_map(|l| l.scheduling.iter().copied())));

pub static EMERGENCY_TERMS: LazyLock<TermSet> =
    LazyLock::new(|| TermSet::new(LEXICONS.iter().flat_map(|l| l.emergency.iter().copied())));

pub static MODERATE_TERMS: LazyLock<TermSet> =
    LazyLock::new(|| TermSet::new(LEXICONS.iter().flat_map(|l| l.moderate.iter().copied())));

/// A compiled, word-bounded alternation over a term list
pub struct TermSet {
    regex: Regex,
}

impl TermSet {
    pub fn new<'a>(terms: impl IntoIterator<Item = &'a str>) -> Self {
        let mut terms: Vec<String> = terms.into_iter().map(fold).collect();
        // Longest first so "febre alta" wins over "febre" at the same position
        terms.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        terms.dedup();

        let alternation = terms
            .iter()
            .map(|t| regex::escape(t))
            .collect::<Vec<_>>()
            .join("|");
        let regex = Regex::new(&format!(r"\b(?:{alternation})\b"))
            .expect("escaped term list is a valid regex");

        Self { regex }
    }

    /// Number of non-overlapping term occurrences in already-folded text
    pub fn count(&self, folded: &str) -> usize {
        self.regex.find_iter(folded).count()
    }

    pub fn matches<'t>(&self, folded: &'t str) -> Vec<&'t str> {
        self.regex.find_iter(folded).map(|m| m.as_str()).collect()
    }
}

/// Lowercase and strip the diacritics used in Portuguese
pub fn fold(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            'ñ' => 'n',
            '’' => '\'',
            other => other,
        })
        .collect()
}
