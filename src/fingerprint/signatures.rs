//! Static signature table for technology detection.
//!
//! Patterns are compiled once. Body and header-value patterns are
//! case-insensitive; cookie patterns are exact names, or prefixes when they
//! end in `*`.

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::probe::ProbeResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Server,
    Language,
    Cms,
    BackendFramework,
    FrontendLibrary,
    Database,
    Waf,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Server => "server",
            Category::Language => "language",
            Category::Cms => "cms",
            Category::BackendFramework => "backend_framework",
            Category::FrontendLibrary => "frontend_library",
            Category::Database => "database",
            Category::Waf => "waf",
        }
    }
}

pub enum HeaderMatch {
    /// Header is present.
    Present(&'static str),
    /// Any header whose name starts with the prefix.
    Prefix(&'static str),
    /// Header value matches.
    Value(&'static str, Regex),
}

impl HeaderMatch {
    /// Returns the evidence source when the response matches.
    pub fn find(&self, response: &ProbeResult) -> Option<String> {
        match self {
            HeaderMatch::Present(name) => response.header(name).map(|_| name.to_string()),
            HeaderMatch::Prefix(prefix) => {
                let prefix = prefix.to_ascii_lowercase();
                response
                    .headers
                    .keys()
                    .find(|k| k.starts_with(&prefix))
                    .map(|k| k.to_string())
            }
            HeaderMatch::Value(name, re) => response
                .header_values(name)
                .iter()
                .any(|v| re.is_match(v))
                .then(|| format!("{}: {}", name, re.as_str())),
        }
    }
}

pub enum VersionSource {
    Header(&'static str, Regex),
    Body(Regex),
}

pub struct Signature {
    pub category: Category,
    pub name: &'static str,
    pub headers: Vec<HeaderMatch>,
    pub body: Vec<Regex>,
    pub cookies: Vec<&'static str>,
    pub paths: Vec<&'static str>,
    pub version: Option<VersionSource>,
    /// Database error messages, matched against error-probe responses.
    pub errors: Vec<Regex>,
}

impl Signature {
    fn new(category: Category, name: &'static str) -> Self {
        Self {
            category,
            name,
            headers: Vec::new(),
            body: Vec::new(),
            cookies: Vec::new(),
            paths: Vec::new(),
            version: None,
            errors: Vec::new(),
        }
    }

    fn header(mut self, name: &'static str) -> Self {
        self.headers.push(HeaderMatch::Present(name));
        self
    }

    fn header_prefix(mut self, prefix: &'static str) -> Self {
        self.headers.push(HeaderMatch::Prefix(prefix));
        self
    }

    fn header_value(mut self, name: &'static str, pattern: &str) -> Self {
        self.headers.push(HeaderMatch::Value(name, re(pattern)));
        self
    }

    fn body(mut self, patterns: &[&str]) -> Self {
        self.body.extend(patterns.iter().map(|p| re(p)));
        self
    }

    fn cookies(mut self, names: &[&'static str]) -> Self {
        self.cookies.extend_from_slice(names);
        self
    }

    fn paths(mut self, paths: &[&'static str]) -> Self {
        self.paths.extend_from_slice(paths);
        self
    }

    fn header_version(mut self, name: &'static str, pattern: &str) -> Self {
        self.version = Some(VersionSource::Header(name, re(pattern)));
        self
    }

    fn body_version(mut self, pattern: &str) -> Self {
        self.version = Some(VersionSource::Body(re(pattern)));
        self
    }

    fn errors(mut self, patterns: &[&str]) -> Self {
        self.errors.extend(patterns.iter().map(|p| re(p)));
        self
    }

    pub fn cookie_matches(&self, cookie: &str) -> Option<&'static str> {
        self.cookies.iter().copied().find(|pattern| match pattern.strip_suffix('*') {
            Some(prefix) => cookie.starts_with(prefix),
            None => cookie == *pattern,
        })
    }

    /// First capture group of the version pattern, if it matched.
    pub fn extract_version(&self, response: &ProbeResult) -> Option<String> {
        let capture = |re: &Regex, text: &str| {
            re.captures(text)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().trim_end_matches('.').to_string())
                .filter(|v| !v.is_empty())
        };
        match self.version.as_ref()? {
            VersionSource::Header(name, re) => {
                response.header_values(name).iter().find_map(|v| capture(re, v))
            }
            VersionSource::Body(re) => capture(re, &response.body),
        }
    }
}

fn re(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .expect("static signature pattern compiles")
}

/// Paths probed regardless of hypotheses. Hits are reported, not scored.
pub const GENERIC_PATHS: &[&str] = &["/robots.txt", "/sitemap.xml", "/.well-known/security.txt", "/phpmyadmin/"];

/// Values sent into one parameter to provoke database errors.
pub const ERROR_PROBE_VALUES: &[&str] = &["'", "\"", "')"];

pub static SIGNATURES: LazyLock<Vec<Signature>> = LazyLock::new(|| {
    use Category::*;
    vec![
        // Servers
        Signature::new(Server, "nginx")
            .header_value("server", r"nginx")
            .header_version("server", r"nginx/([\d.]+)"),
        Signature::new(Server, "Apache")
            .header_value("server", r"Apache(/|$|\s)")
            .header_version("server", r"Apache/([\d.]+)"),
        Signature::new(Server, "IIS")
            .header_value("server", r"Microsoft-IIS")
            .header_version("server", r"Microsoft-IIS/([\d.]+)"),
        Signature::new(Server, "Tomcat")
            .header_value("server", r"Apache-Coyote")
            .header_version("server", r"Apache-Coyote/([\d.]+)"),
        Signature::new(Server, "lighttpd")
            .header_value("server", r"lighttpd")
            .header_version("server", r"lighttpd/([\d.]+)"),
        // Backend languages
        Signature::new(Language, "PHP")
            .header_value("x-powered-by", r"PHP")
            .cookies(&["PHPSESSID", "laravel_session"])
            .header_version("x-powered-by", r"PHP/([\d.]+)"),
        Signature::new(Language, "Python")
            .header_value("server", r"Werkzeug|gunicorn|Python")
            .cookies(&["csrftoken", "sessionid"]),
        Signature::new(Language, "Node.js")
            .header_value("x-powered-by", r"Express|Next\.js")
            .cookies(&["connect.sid"]),
        Signature::new(Language, "Java")
            .header_value("x-powered-by", r"Servlet|JSP")
            .cookies(&["JSESSIONID"]),
        Signature::new(Language, ".NET")
            .header_value("x-powered-by", r"ASP\.NET")
            .header("x-aspnet-version")
            .cookies(&["ASP.NET_SessionId"])
            .header_version("x-aspnet-version", r"([\d.]+)"),
        // CMS
        Signature::new(Cms, "WordPress")
            .body(&["wp-content", "wp-includes", "wp-admin", r#"<meta name="generator" content="WordPress"#])
            .cookies(&["wordpress_*", "wp-settings-*"])
            .paths(&["/wp-login.php", "/wp-admin/"])
            .body_version(r#"<meta name="generator" content="WordPress\s*([\d.]+)"#),
        Signature::new(Cms, "Joomla")
            .body(&["/components/com_", "/media/jui/", r#"<meta name="generator" content="Joomla"#])
            .paths(&["/administrator/"])
            .body_version(r#"<meta name="generator" content="Joomla!?\s*([\d.]+)"#),
        Signature::new(Cms, "Drupal")
            .body(&[r"Drupal\.settings", "/sites/default/", "/sites/all/", r#"<meta name="generator" content="Drupal"#])
            .header("x-drupal-cache")
            .header_value("x-generator", r"Drupal")
            .cookies(&["SESS*", "SSESS*"])
            .paths(&["/user/login"])
            .body_version(r#"<meta name="generator" content="Drupal\s*([\d.]+)"#),
        Signature::new(Cms, "Magento")
            .body(&["/skin/frontend/", r"Mage\.Cookies", "varien/js"])
            .cookies(&["frontend"])
            .paths(&["/admin", "/downloader/"]),
        Signature::new(Cms, "Shopify")
            .body(&[r"cdn\.shopify\.com", r"Shopify\.theme"])
            .header("x-shopid")
            .cookies(&["_shopify_*"]),
        // Backend frameworks
        Signature::new(BackendFramework, "Laravel")
            .body(&["laravel"])
            .cookies(&["laravel_session", "XSRF-TOKEN"])
            .header("x-laravel")
            .paths(&["/_ignition/health-check"]),
        Signature::new(BackendFramework, "Django")
            .body(&["csrfmiddlewaretoken", "__admin"])
            .cookies(&["csrftoken", "sessionid"])
            .paths(&["/admin/login/"]),
        Signature::new(BackendFramework, "Flask")
            .body(&["Werkzeug"])
            .cookies(&["session"])
            .header_value("server", r"Werkzeug")
            .paths(&["/console"]),
        Signature::new(BackendFramework, "Express")
            .cookies(&["connect.sid"])
            .header_value("x-powered-by", r"Express"),
        Signature::new(BackendFramework, "Spring")
            .body(&["Whitelabel Error Page"])
            .cookies(&["JSESSIONID"])
            .paths(&["/actuator/health"]),
        Signature::new(BackendFramework, "ASP.NET")
            .body(&["__VIEWSTATE", "__EVENTVALIDATION"])
            .cookies(&["ASP.NET_SessionId"])
            .header("x-aspnet-version")
            .header("x-aspnetmvc-version")
            .paths(&["/elmah.axd"]),
        // Frontend libraries
        Signature::new(FrontendLibrary, "React").body(&[r"react(\.production|\.development|-dom)", "data-reactroot", "_reactRootContainer"]),
        Signature::new(FrontendLibrary, "Vue").body(&[r"vue(\.min)?\.js", "data-v-", r"Vue\.createApp"]),
        Signature::new(FrontendLibrary, "Angular").body(&["ng-app", "ng-controller", r"angular(\.min)?\.js", "ng-version"]),
        Signature::new(FrontendLibrary, "jQuery").body(&[r"jquery(-[\d.]+)?(\.min)?\.js", r"jQuery\("]),
        Signature::new(FrontendLibrary, "Bootstrap").body(&[r"bootstrap(\.min)?\.(css|js)", "btn-primary"]),
        Signature::new(FrontendLibrary, "Tailwind").body(&["tailwind"]),
        // Databases
        Signature::new(Database, "mysql").errors(&[
            r"SQL syntax.*MySQL",
            r"Warning.*mysql_",
            r"MySQLSyntaxErrorException",
            r"valid MySQL result",
            r"check the manual that corresponds to your (MySQL|MariaDB)",
            r"mysql_fetch",
            r"mysql_num_rows",
        ]),
        Signature::new(Database, "postgresql").errors(&[
            r"PostgreSQL.*ERROR",
            r"Warning.*\Wpg_",
            r"valid PostgreSQL result",
            r"Npgsql\.",
            r"PG::SyntaxError",
            r"org\.postgresql\.util\.PSQLException",
            r"unterminated quoted string at or near",
        ]),
        Signature::new(Database, "mssql").errors(&[
            r"Driver.*SQL Server",
            r"OLE DB.*SQL Server",
            r"(\W|\A)SQL Server.*Driver",
            r"Warning.*mssql_",
            r"Microsoft SQL Native Client error",
            r"ODBC SQL Server Driver",
            r"SQLServer JDBC Driver",
            r"Unclosed quotation mark after the character string",
        ]),
        Signature::new(Database, "oracle").errors(&[
            r"\bORA-[0-9]{4}",
            r"Oracle error",
            r"Oracle.*Driver",
            r"Warning.*\Woci_",
            r"quoted string not properly terminated",
        ]),
        Signature::new(Database, "sqlite").errors(&[
            r"SQLite/JDBCDriver",
            r"SQLite\.Exception",
            r"System\.Data\.SQLite\.SQLiteException",
            r"Warning.*sqlite_",
            r"sqlite3\.OperationalError",
            r#"unrecognized token: "'"#,
        ]),
        Signature::new(Database, "mongodb").errors(&[
            r"MongoError",
            r"mongodb://",
            r"TypeError: db\.\w+ is not a function",
        ]),
        // WAFs
        Signature::new(Waf, "cloudflare")
            .header("cf-ray")
            .header("cf-cache-status")
            .header_value("server", r"cloudflare")
            .cookies(&["__cfduid", "__cflb", "__cf_bm"])
            .body(&[r"Attention Required! \| Cloudflare", "cloudflare-nginx"]),
        Signature::new(Waf, "akamai")
            .header_prefix("x-akamai-")
            .header_value("server", r"AkamaiGHost")
            .cookies(&["ak_bmsc", "bm_sv"]),
        Signature::new(Waf, "aws_waf")
            .header_prefix("x-amzn-")
            .header_prefix("x-amz-cf-")
            .cookies(&["AWSALB", "aws-waf-token"])
            .body(&[r"Access Denied.*AWS"]),
        Signature::new(Waf, "modsecurity")
            .header_value("server", r"Mod_Security|NOYB")
            .body(&["Mod_Security", "ModSecurity", "NOYB"]),
        Signature::new(Waf, "f5")
            .header("x-wa-info")
            .cookies(&["TS*", "F5*", "BIGipServer*"]),
        Signature::new(Waf, "imperva")
            .header("x-iinfo")
            .header_value("x-cdn", r"Incapsula")
            .cookies(&["incap_ses_*", "visid_incap_*"]),
    ]
});

/// Every database error pattern, tagged with its dialect.
pub fn database_error_matches(body: &str) -> Vec<(&'static str, &'static Regex)> {
    SIGNATURES
        .iter()
        .filter(|s| s.category == Category::Database)
        .flat_map(|s| s.errors.iter().map(move |re| (s.name, re)))
        .filter(|(_, re)| re.is_match(body))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_compiles_and_covers_categories() {
        let table = &*SIGNATURES;
        for cat in [
            Category::Server,
            Category::Language,
            Category::Cms,
            Category::BackendFramework,
            Category::FrontendLibrary,
            Category::Database,
            Category::Waf,
        ] {
            assert!(table.iter().any(|s| s.category == cat), "no signatures for {:?}", cat);
        }
    }

    #[test]
    fn test_cookie_prefix_and_exact() {
        let wp = SIGNATURES.iter().find(|s| s.name == "WordPress").unwrap();
        assert_eq!(wp.cookie_matches("wordpress_logged_in_abc"), Some("wordpress_*"));
        let flask = SIGNATURES.iter().find(|s| s.name == "Flask").unwrap();
        assert_eq!(flask.cookie_matches("sessionid"), None);
        assert_eq!(flask.cookie_matches("session"), Some("session"));
    }

    #[test]
    fn test_server_version_extraction() {
        let nginx = SIGNATURES.iter().find(|s| s.name == "nginx").unwrap();
        let r = ProbeResult::captured("GET /", 200, &[("Server", "nginx/1.18.0 (Ubuntu)")], "");
        assert_eq!(nginx.extract_version(&r).as_deref(), Some("1.18.0"));
        assert!(nginx.headers[0].find(&r).is_some());
    }

    #[test]
    fn test_mysql_error_matches_two_signatures() {
        let body = "You have an error in your SQL syntax; check the manual that corresponds to your MySQL server version for the right syntax to use near ''1''' at line 1";
        let hits = database_error_matches(body);
        assert!(hits.len() >= 2);
        assert!(hits.iter().all(|(db, _)| *db == "mysql"));
    }

    #[test]
    fn test_header_prefix_match() {
        let akamai = SIGNATURES.iter().find(|s| s.name == "akamai").unwrap();
        let r = ProbeResult::captured("GET /", 200, &[("X-Akamai-Transformed", "9 - 0 pmb=mRUM,1")], "");
        assert_eq!(akamai.headers[0].find(&r).as_deref(), Some("x-akamai-transformed"));
    }
}
