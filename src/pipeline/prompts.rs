// Prompt templates for the generation stages

use super::context::{self, GenerationContext};
use super::stage::StageKind;
use crate::calendar::ContentCategory;
use crate::config::Persona;

/// Post template the compose stage follows for each category
pub fn category_template(category: ContentCategory) -> &'static str {
    match category {
        ContentCategory::EducationExplainer => {
            "Template: \"Everyone talks about [topic] but here's the simple breakdown 🧵👇\"\n\
             Structure: hook, what it is in plain English, why it matters for a business, \
             one example, key takeaway, closing question (\"What would you build with this?\")."
        }
        ContentCategory::ExperimentCaseStudy => {
            "Template: \"Tried building [automation] today. Here's what worked ✅ and what broke ❌\"\n\
             Structure: setup, two or three wins, two or three failures, the lesson, \
             closing question (\"Anyone else tested this?\")."
        }
        ContentCategory::HotTakeOpinion => {
            "Template: \"Most people think [common belief]. They're wrong. Here's why 👇\"\n\
             Structure: bold claim, supporting evidence, prediction, closing \"Agree?\". \
             Confident, never arrogant."
        }
        ContentCategory::VisualFramework => {
            "Template: \"Stop overcomplicating [topic]. Here's the simple framework I use 👇\"\n\
             Structure: problem, framework in 3-5 steps, note that a visual accompanies it, \
             closing \"Should I turn this into a full thread?\"."
        }
        ContentCategory::EngagementBooster => {
            "Template: a question or poll that sparks discussion.\n\
             Structure: one interesting question, options A-D or an open prompt, context if \
             needed, closing \"Drop your thoughts 👇\"."
        }
        ContentCategory::PersonalJourney => {
            "Template: \"Documenting my automation journey publicly. Current status: [update] 🚀\"\n\
             Structure: personal update, a small win or failure, what was learned, next step."
        }
    }
}

/// What the research stage should dig up for each category
pub fn research_brief(category: ContentCategory) -> &'static str {
    match category {
        ContentCategory::EducationExplainer => {
            "Provide: 3 key concepts to explain simply, real-world small business examples, \
             common misconceptions, actionable takeaways."
        }
        ContentCategory::ExperimentCaseStudy => {
            "Provide: a realistic automation scenario, expected challenges and fixes, \
             measurable outcomes (time saved, cost reduced), lessons learned, tools used."
        }
        ContentCategory::HotTakeOpinion => {
            "Provide: a common belief to challenge, evidence for the contrarian view, a \
             prediction, and the angle most likely to start a discussion."
        }
        ContentCategory::VisualFramework => {
            "Provide: a process worth visualising, its 3-5 components, a simple analogy, a \
             description of the diagram, and why it helps a business."
        }
        ContentCategory::EngagementBooster => {
            "Provide: an interesting question, poll options that split opinion, a \
             discussion starter, relatable scenarios."
        }
        ContentCategory::PersonalJourney => {
            "Provide: a realistic learning experience, wins and failures worth sharing, \
             relatable struggles, and what is being built or tested next."
        }
    }
}

fn role_instructions(kind: StageKind, category: ContentCategory, char_limit: usize) -> String {
    match kind {
        StageKind::Research => format!(
            "You research content for a social account about AI automation. \
             Target audience: small business owners, entrepreneurs and tech professionals.\n\n{}",
            research_brief(category)
        ),
        StageKind::Compose => format!(
            "You write short social posts.\n\nUse this template:\n{}\n\n\
             Rules:\n- Stay under {} characters\n- At most one emoji\n\
             - End with an engagement hook\n- Sound natural, not robotic",
            category_template(category),
            char_limit
        ),
        StageKind::EnrichKeywords => {
            "You optimise posts for discoverability. Add 2-4 relevant hashtags or keywords \
             where they read naturally. Keep the message unchanged."
                .to_string()
        }
        StageKind::Finalize => format!(
            "You produce the final version of a post. Maximise engagement, keep the \
             author's voice, keep hashtags well placed, and stay under {} characters.",
            char_limit
        ),
    }
}

/// System prompt for `kind`; revision mode puts the reviewer's feedback first,
/// verbatim.
pub fn system_prompt(
    kind: StageKind,
    category: ContentCategory,
    persona: &Persona,
    char_limit: usize,
    feedback: Option<&str>,
) -> String {
    let mut prompt = String::new();

    if let Some(feedback) = feedback {
        prompt.push_str("THE PREVIOUS VERSION WAS REJECTED. Address this reviewer feedback:\n");
        prompt.push_str(feedback);
        prompt.push_str("\n\n");
    }

    prompt.push_str(&role_instructions(kind, category, char_limit));
    prompt.push_str("\n\n");
    prompt.push_str(&persona.to_system_block());
    prompt
}

/// User prompt for `kind`, built from the fields earlier stages attached
pub fn user_prompt(kind: StageKind, category: ContentCategory, ctx: &GenerationContext) -> String {
    let field = |key: &str| ctx.get(key).unwrap_or("").to_string();

    match kind {
        StageKind::Research => {
            let mut prompt = format!(
                "Content type: {}\nTheme: {}\nTopic: {}\n",
                category,
                ctx.get(context::THEME).unwrap_or("general"),
                field(context::TOPIC),
            );
            if ctx.contains(context::THREAD) {
                prompt.push_str("Format: this is a thread day, research for a multi-post thread.\n");
            }
            prompt.push_str("\nCURRENT TRENDS AND NEWS:\n");
            prompt.push_str(ctx.get(context::TRENDS).unwrap_or(crate::trends::NO_TRENDS));
            prompt.push_str(
                "\n\nUse recent developments where they help. Focus on practical insights.",
            );
            prompt
        }
        StageKind::Compose => format!(
            "Content type: {}\nTheme: {}\nTopic: {}\nResearch:\n{}\n\n\
             Write one post following the template. Return only the post.",
            category,
            ctx.get(context::THEME).unwrap_or("general"),
            field(context::TOPIC),
            field(StageKind::Research.output_key()),
        ),
        StageKind::EnrichKeywords => format!(
            "Optimise this post:\n{}\n\nReturn only the post with keywords in place.",
            field(StageKind::Compose.output_key()),
        ),
        StageKind::Finalize => format!(
            "Content:\n{}\n\nReturn only the final post text, ready to post.",
            field(StageKind::EnrichKeywords.output_key()),
        ),
    }
}
