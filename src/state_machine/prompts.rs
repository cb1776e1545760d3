//! Deterministic assistant replies
//!
//! Follow-up questions depend only on the stage, never on model output.

use super::state::{DiagnosticHypothesis, Stage, UrgencyLevel};
use std::fmt::Write;

pub const GREETING: &str = "Olá! Sou o assistente clínico. Descreva o que você está sentindo \
para iniciarmos uma avaliação, ou peça para agendar uma consulta.";

pub const SCHEDULING: &str = "Para agendar uma consulta, acesse a área de Agendamentos e escolha \
o médico, a data e o horário disponíveis.";

pub const EMERGENCY_ADVISORY: &str = "ATENÇÃO: os sintomas descritos podem indicar uma \
emergência. Procure imediatamente o pronto-socorro mais próximo ou ligue para o SAMU (192).";

pub const ANALYSIS_UNAVAILABLE: &str = "Recebi todas as informações, mas não consegui concluir \
a análise agora. Envie qualquer mensagem para tentar novamente em instantes.";

pub const ALREADY_COMPLETE: &str = "Esta avaliação já foi concluída. Envie uma nova mensagem \
para iniciar outra triagem.";

pub const CLEARED: &str = "Conversa encerrada. Quando quiser, descreva seus sintomas para \
começar uma nova avaliação.";

/// Generic reply for failures the user cannot act on
pub const FALLBACK: &str =
    "Desculpe, ocorreu um problema ao processar sua mensagem. Tente novamente em instantes.";

const DISCLAIMER: &str = "Esta análise é apenas uma orientação inicial e não substitui uma \
consulta médica.";

/// Question asked when the conversation enters `stage`
pub fn stage_prompt(stage: Stage) -> &'static str {
    match stage {
        Stage::Initial => GREETING,
        Stage::Duration => "Entendi. Há quanto tempo você está sentindo isso?",
        Stage::Intensity => {
            "Numa escala de 0 a 10, qual a intensidade do que você está sentindo?"
        }
        Stage::Quality => {
            "Como você descreveria a sensação? Por exemplo: pontada, queimação, pressão ou \
             latejante."
        }
        Stage::Factors => {
            "Existe algo que piora ou melhora os sintomas, como movimento, alimentação, \
             repouso ou medicamentos?"
        }
        Stage::History => {
            "Você tem algum problema de saúde prévio, usa medicamentos contínuos ou tem \
             alergias?"
        }
        Stage::Analysis => "Obrigado pelas informações. Estou analisando o seu quadro.",
        Stage::Complete => ALREADY_COMPLETE,
    }
}

/// Scheduling reply, reminding the pending question when an interview is open
pub fn scheduling_reply(stage: Stage) -> String {
    if stage.is_interview_active() {
        format!(
            "{SCHEDULING}\n\nPara continuarmos a avaliação: {}",
            stage_prompt(stage)
        )
    } else {
        SCHEDULING.to_string()
    }
}

pub fn hypotheses_reply(hypotheses: &[DiagnosticHypothesis], urgency: UrgencyLevel) -> String {
    let mut out = String::new();

    if hypotheses.is_empty() {
        out.push_str(
            "Com base nas informações fornecidas, não foi possível apontar hipóteses \
             específicas. Recomendamos uma consulta para avaliação presencial.",
        );
    } else {
        out.push_str(
            "Com base nas informações fornecidas, estas são as hipóteses a serem avaliadas \
             por um médico:",
        );
        for (i, h) in hypotheses.iter().enumerate() {
            let _ = write!(out, "\n{}. {} ({}%)", i + 1, h.condition, h.probability);
            if !h.reasoning.is_empty() {
                let _ = write!(out, ": {}", h.reasoning);
            }
        }
    }

    let _ = write!(
        out,
        "\n\nNível de urgência: {}. {DISCLAIMER}",
        urgency.label_pt()
    );
    out
}
