// Parameter templating: `{{ var }}` substitution in string-valued action params
use super::types::RoundContext;
use serde_yaml::{Mapping, Value as YamlValue};

/// Renders action parameters against the current round.
///
/// With the `jinja` feature the full template language is available
/// (undefined names are errors); without it only `{{ name }}` tokens are
/// replaced. A template that fails to render is returned unchanged.
pub struct ParamRenderer {
    #[cfg(feature = "jinja")]
    env: minijinja::Environment<'static>,
}

impl Default for ParamRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl ParamRenderer {
    #[cfg(feature = "jinja")]
    pub fn new() -> Self {
        let mut env = minijinja::Environment::new();
        env.set_undefined_behavior(minijinja::UndefinedBehavior::Strict);
        Self { env }
    }

    #[cfg(not(feature = "jinja"))]
    pub fn new() -> Self {
        Self {}
    }

    pub fn render(&self, template: &str, round: &RoundContext) -> String {
        if !template.contains("{{") && !template.contains("{%") {
            return template.to_string();
        }
        self.render_engine(template, round)
    }

    #[cfg(feature = "jinja")]
    fn render_engine(&self, template: &str, round: &RoundContext) -> String {
        let ctx = minijinja::context! {
            vars => &round.variables,
            last_match_score => round.last_match_score,
            attempts => round.attempts,
        };
        match self.env.render_str(template, ctx) {
            Ok(rendered) => rendered,
            Err(e) => {
                log::warn!("⚠️ Could not render '{}': {}", template, e);
                template.to_string()
            }
        }
    }

    #[cfg(not(feature = "jinja"))]
    fn render_engine(&self, template: &str, round: &RoundContext) -> String {
        substitute_plain(template, round)
    }

    /// Copy of `params` with every string value rendered, nested values included
    pub fn render_params(&self, params: &Mapping, round: &RoundContext) -> Mapping {
        params
            .iter()
            .map(|(k, v)| (k.clone(), self.render_value(v, round)))
            .collect()
    }

    fn render_value(&self, value: &YamlValue, round: &RoundContext) -> YamlValue {
        match value {
            YamlValue::String(s) => YamlValue::String(self.render(s, round)),
            YamlValue::Sequence(items) => {
                YamlValue::Sequence(items.iter().map(|v| self.render_value(v, round)).collect())
            }
            YamlValue::Mapping(mapping) => YamlValue::Mapping(self.render_params(mapping, round)),
            other => other.clone(),
        }
    }
}

/// Literal replacement of `{{ name }}` / `{{name}}` tokens for variables
/// (also as `vars.name`), `last_match_score` and `attempts`.
pub fn substitute_plain(template: &str, round: &RoundContext) -> String {
    let mut replacements: Vec<(String, String)> = vec![
        ("last_match_score".to_string(), round.last_match_score.to_string()),
        ("attempts".to_string(), round.attempts.to_string()),
    ];
    for (key, value) in &round.variables {
        replacements.push((key.clone(), value.clone()));
        replacements.push((format!("vars.{key}"), value.clone()));
    }
    let mut out = template.to_string();
    for (name, value) in replacements {
        out = out
            .replace(&format!("{{{{ {name} }}}}"), &value)
            .replace(&format!("{{{{{name}}}}}"), &value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::variables::Variables;

    fn round() -> RoundContext {
        let mut variables = Variables::new();
        variables.insert("user".to_string(), "alice".to_string());
        let mut round = RoundContext::new(variables, None);
        round.attempts = 3;
        round.last_match_score = 0.5;
        round
    }

    #[test]
    fn test_plain_text_untouched() {
        assert_eq!(ParamRenderer::new().render("no tokens here", &round()), "no tokens here");
    }

    #[test]
    fn test_render_score_and_vars() {
        let renderer = ParamRenderer::new();
        let r = round();
        assert_eq!(renderer.render("score={{ last_match_score }}", &r), "score=0.5");
        assert_eq!(renderer.render("hi {{ vars.user }} #{{attempts}}", &r), "hi alice #3");
    }

    #[test]
    fn test_undefined_left_unchanged() {
        let renderer = ParamRenderer::new();
        let r = round();
        assert_eq!(renderer.render("{{ vars.missing }}", &r), "{{ vars.missing }}");
        assert_eq!(renderer.render("{{ nope }}", &r), "{{ nope }}");
    }

    #[test]
    fn test_substitute_plain_forms() {
        let r = round();
        assert_eq!(
            substitute_plain("{{ user }}/{{user}}/{{ vars.user }}/{{ attempts }}", &r),
            "alice/alice/alice/3"
        );
    }

    #[test]
    fn test_render_params_nested() {
        let params: Mapping =
            serde_yaml::from_str("message: 'found {{ vars.user }}'\nscales: [0.5, 1.0]\nlist: ['{{ attempts }}']\n")
                .unwrap();
        let rendered = ParamRenderer::new().render_params(&params, &round());
        assert_eq!(rendered["message"], YamlValue::from("found alice"));
        assert_eq!(rendered["scales"], params["scales"]);
        assert_eq!(rendered["list"][0], YamlValue::from("3"));
    }
}
