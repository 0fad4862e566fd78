//! `{{state.<key>}}` 占位符替换：纯字面替换，无表达式、无转义，未知键原样保留

use std::collections::BTreeMap;

const OPEN: &str = "{{state.";
const CLOSE: &str = "}}";

pub fn interpolate(template: &str, state: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            out.push_str(&rest[start..]);
            return out;
        };
        let key = &after_open[..end];
        match state.get(key) {
            Some(value) => out.push_str(value),
            None => out.push_str(&rest[start..start + OPEN.len() + end + CLOSE.len()]),
        }
        rest = &after_open[end + CLOSE.len()..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn replaces_known_keys_everywhere() {
        let s = state(&[("research", "facts"), ("A", "ok")]);
        assert_eq!(interpolate("Summarize: {{state.research}}", &s), "Summarize: facts");
        assert_eq!(interpolate("{{state.A}}+{{state.A}}", &s), "ok+ok");
    }

    #[test]
    fn unknown_and_unterminated_stay_verbatim() {
        let s = state(&[("a", "1")]);
        assert_eq!(interpolate("x {{state.b}} y {{state.a}}", &s), "x {{state.b}} y 1");
        assert_eq!(interpolate("tail {{state.a", &s), "tail {{state.a");
        assert_eq!(interpolate("{{ state.a }}", &s), "{{ state.a }}");
    }

    #[test]
    fn values_are_not_reinterpolated() {
        let s = state(&[("a", "{{state.b}}"), ("b", "2")]);
        assert_eq!(interpolate("{{state.a}}", &s), "{{state.b}}");
    }
}
