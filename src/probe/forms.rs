//! Injection-point discovery in target pages: URL query pairs and HTML forms.

use std::sync::LazyLock;

use reqwest::Url;
use scraper::{ElementRef, Html, Selector};

use super::request::{ProbeMethod, ProbeRequest};

static FORM_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("form").expect("form selector"));
static FIELD_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("input, textarea, select").expect("field selector"));
static OPTION_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("option").expect("option selector"));

/// Field types that never carry user data.
const SKIPPED_TYPES: &[&str] = &["submit", "button", "image", "file", "reset"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub name: String,
    pub value: String,
    pub hidden: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlForm {
    /// Absolute submission URL.
    pub action: String,
    pub method: ProbeMethod,
    pub fields: Vec<FormField>,
}

impl HtmlForm {
    /// Request submitting the form with one field's value replaced.
    pub fn submit_with(&self, field: &str, value: &str) -> ProbeRequest {
        let pairs: Vec<(String, String)> = self
            .fields
            .iter()
            .map(|f| {
                let v = if f.name == field { value.to_string() } else { f.value.clone() };
                (f.name.clone(), v)
            })
            .collect();
        match self.method {
            ProbeMethod::Get => ProbeRequest::get(self.action.clone()).with_query_pairs(pairs),
            ProbeMethod::Post => ProbeRequest::post_form(self.action.clone(), pairs),
        }
    }
}

/// Value a browser would submit: the `value` attribute for inputs, the text
/// of a textarea, the selected (or first) option of a select.
fn field_value(element: &ElementRef) -> String {
    match element.value().name() {
        "textarea" => element.text().collect(),
        "select" => {
            let options: Vec<ElementRef> = element.select(&OPTION_SELECTOR).collect();
            options
                .iter()
                .find(|o| o.value().attr("selected").is_some())
                .or_else(|| options.first())
                .map(|o| match o.value().attr("value") {
                    Some(v) => v.to_string(),
                    None => o.text().collect::<String>().trim().to_string(),
                })
                .unwrap_or_default()
        }
        _ => element.value().attr("value").unwrap_or("").to_string(),
    }
}

fn form_field(element: ElementRef) -> Option<FormField> {
    let name = element.value().attr("name").filter(|n| !n.is_empty())?.to_string();
    let kind = element.value().attr("type").unwrap_or("text").to_ascii_lowercase();
    if element.value().name() == "input" && SKIPPED_TYPES.contains(&kind.as_str()) {
        return None;
    }
    Some(FormField {
        value: field_value(&element),
        hidden: kind == "hidden",
        name,
    })
}

/// Forms in `body`, with actions resolved against `page_url`.
pub fn extract_forms(body: &str, page_url: &str) -> Vec<HtmlForm> {
    let document = Html::parse_document(body);
    let base = Url::parse(page_url).ok();
    document
        .select(&FORM_SELECTOR)
        .map(|form| {
            let action = form.value().attr("action").unwrap_or("").trim();
            let action = match &base {
                Some(base) if !action.is_empty() => {
                    base.join(action).map(|u| u.to_string()).unwrap_or_else(|_| page_url.to_string())
                }
                _ => page_url.to_string(),
            };
            let method = match form.value().attr("method") {
                Some(m) if m.eq_ignore_ascii_case("post") => ProbeMethod::Post,
                _ => ProbeMethod::Get,
            };
            let fields = form.select(&FIELD_SELECTOR).filter_map(form_field).collect();
            HtmlForm { action, method, fields }
        })
        .collect()
}

/// Split a URL into its query-less form and its query pairs.
pub fn split_query(url: &str) -> (String, Vec<(String, String)>) {
    match Url::parse(url) {
        Ok(mut parsed) => {
            let pairs: Vec<(String, String)> = parsed
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            parsed.set_query(None);
            parsed.set_fragment(None);
            (parsed.to_string(), pairs)
        }
        Err(_) => (url.to_string(), Vec::new()),
    }
}

/// Request for `url` with one query parameter's value replaced.
pub fn query_with(url: &str, pairs: &[(String, String)], name: &str, value: &str) -> ProbeRequest {
    let pairs = pairs
        .iter()
        .map(|(k, v)| (k.clone(), if k == name { value.to_string() } else { v.clone() }))
        .collect();
    ProbeRequest::get(url).with_query_pairs(pairs)
}

/// `scheme://host[:port]` of a URL.
pub fn origin(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(match parsed.port() {
        Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
        None => format!("{}://{}", parsed.scheme(), host),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGIN_PAGE: &str = r#"
        <html><body>
        <form action="/login" method="POST">
          <input type="text" name="username" value="">
          <input type='password' name='password'>
          <input type="hidden" name="csrf_token" value="abc123">
          <input type="submit" name="go" value="Sign in">
        </form>
        <form><input name=q value=shoes></form>
        </body></html>"#;

    #[test]
    fn test_extract_forms() {
        let forms = extract_forms(LOGIN_PAGE, "http://shop.test/account/");
        assert_eq!(forms.len(), 2);

        let login = &forms[0];
        assert_eq!(login.action, "http://shop.test/login");
        assert_eq!(login.method, ProbeMethod::Post);
        let names: Vec<&str> = login.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["username", "password", "csrf_token"]);
        assert!(login.fields[2].hidden);

        let search = &forms[1];
        assert_eq!(search.action, "http://shop.test/account/");
        assert_eq!(search.method, ProbeMethod::Get);
        assert_eq!(search.fields[0].value, "shoes");
    }

    #[test]
    fn test_attribute_values_with_angle_brackets_and_entities() {
        let page = r#"<form action="/s"><input placeholder="a > b" name="q" value="A&amp;B"></form>"#;
        let forms = extract_forms(page, "http://shop.test/");
        assert_eq!(forms[0].fields, vec![FormField { name: "q".into(), value: "A&B".into(), hidden: false }]);
    }

    #[test]
    fn test_unclosed_form_still_found() {
        let forms = extract_forms(r#"<form action="/s"><input name="q" value="1">"#, "http://shop.test/");
        assert_eq!(forms.len(), 1);
        assert_eq!(forms[0].action, "http://shop.test/s");
        assert_eq!(forms[0].fields[0].name, "q");
    }

    #[test]
    fn test_textarea_and_select_values() {
        let page = r#"<form method="post">
            <textarea name="comment">hello</textarea>
            <select name="sort"><option value="name">Name</option><option value="price" selected>Price</option></select>
            <select name="dir"><option>asc</option><option>desc</option></select>
            <button type="submit" name="go">Go</button>
        </form>"#;
        let forms = extract_forms(page, "http://shop.test/list");
        let values: Vec<(&str, &str)> = forms[0].fields.iter().map(|f| (f.name.as_str(), f.value.as_str())).collect();
        assert_eq!(values, vec![("comment", "hello"), ("sort", "price"), ("dir", "asc")]);
    }

    #[test]
    fn test_submit_with_replaces_one_field() {
        let forms = extract_forms(LOGIN_PAGE, "http://shop.test/");
        let req = forms[0].submit_with("username", "admin'");
        assert_eq!(req.method, ProbeMethod::Post);
        assert!(req.form.contains(&("username".to_string(), "admin'".to_string())));
        assert!(req.form.contains(&("csrf_token".to_string(), "abc123".to_string())));
    }

    #[test]
    fn test_split_query_and_replace() {
        let (base, pairs) = split_query("http://t.test/item.php?id=4&sort=asc#top");
        assert_eq!(base, "http://t.test/item.php");
        assert_eq!(pairs, vec![("id".into(), "4".into()), ("sort".into(), "asc".into())]);

        let req = query_with(&base, &pairs, "id", "4'");
        assert_eq!(req.describe(), "GET http://t.test/item.php?id=4'&sort=asc");
    }

    #[test]
    fn test_origin() {
        assert_eq!(origin("http://127.0.0.1:8080/a/b?c=d").as_deref(), Some("http://127.0.0.1:8080"));
        assert_eq!(origin("https://example.com/").as_deref(), Some("https://example.com"));
        assert_eq!(origin("nope"), None);
    }
}
