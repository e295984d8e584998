/// One facial expression chosen by the LLM for a reply.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct ExpressionCue {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f32>,
}

/// The strict JSON contract the companion asks the LLM to answer with.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompanionReply {
    #[serde(default)]
    pub response_text: String,
    #[serde(default)]
    pub expressions: Vec<ExpressionCue>,
}

impl CompanionReply {
    /// Only the first expression is used, for the whole reply.
    pub fn primary_expression(&self) -> Option<&ExpressionCue> {
        self.expressions.first()
    }
}
