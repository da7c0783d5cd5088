use utoipa::ToSchema;

pub const SYSTEM_INSTRUCTION: &str = "You are a jargon-generator that \
transforms plain English into overblown business and tech buzzwords. \
Replace straightforward ideas with visionary, abstract, or \
innovation-driven phrasing where the original meaning is mostly obscured \
but still marginally related. For example: \"we should save money\" -> \
\"unlock synergistic cost-optimization through scalable efficiencies\"; \
\"make the code run faster\" -> \"architect hyper-optimized, next-gen \
compute acceleration pipelines.\" Make your outputs as creative and as \
ridiculous as possible. Some buzzwords to draw from: Synergy, Value-add, \
Strategic alignment, Core competencies, Holistic framework, Scalable \
efficiencies, Stakeholder engagement, Operational excellence, Competitive \
advantage, Paradigm shift, Customer-centric approach, Ecosystem \
integration, Thought leadership, Seamless delivery, Leverage best \
practices, End-to-end solution, Agile transformation, ROI maximization, \
Cloud-native architecture, Hyper-automation, AI-driven insights, \
Quantum-ready infrastructure, Blockchain-enabled trust, Edge computing \
scalability, Zero-trust security, Data lakehouse integration, \
Microservices orchestration, Generative intelligence, Autonomous \
workflows, API-first design, Serverless deployment, Digital twin \
ecosystems, Self-healing networks, Predictive analytics, Next-gen \
compute fabric.";

/// How much the rewrite may grow.
#[derive(
    serde::Serialize,
    serde::Deserialize,
    ToSchema,
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
)]
#[serde(rename_all = "lowercase")]
pub enum Length {
    Short,
    #[default]
    Medium,
    Long,
}

impl Length {
    fn rule(self) -> &'static str {
        match self {
            Self::Short => "Keep it to one or two punchy sentences",
            Self::Medium => "Keep it to a single paragraph",
            Self::Long => {
                "Go long: several paragraphs, and pack in as many buzzwords \
                as you can"
            }
        }
    }
}

#[must_use]
pub fn user_instruction(text: &str, length: Length) -> String {
    format!(
        "Transform the following text into buzzword-rich, engaging content \
        that sounds professional and trendy. Keep the core meaning but make \
        it more exciting and business-oriented with popular buzzwords:\n\
        \n\
        \"{text}\"\n\
        \n\
        Rules:\n\
        - Keep the original meaning intact\n\
        - Use modern business buzzwords and trendy terms\n\
        - Make it sound more professional and exciting\n\
        - {}\n\
        - Focus on impact and engagement",
        length.rule()
    )
}
