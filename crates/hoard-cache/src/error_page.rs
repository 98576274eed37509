//! Locally generated error responses.

use hoard_fresh::CacheMetadata;
use hoard_types::{CacheControl, CacheKey, Directives};

use crate::cache::Cache;
use crate::error::CacheResult;
use crate::object::Object;
use crate::status::Visibility;

impl Cache {
    /// Build a private, local, complete object whose body is an HTML page
    /// describing `code` and `message` for the resource at `key`.
    ///
    /// A failed fetch is turned into one of these rather than surfaced as an
    /// error to the requestor.
    pub fn error_object(&self, key: CacheKey, code: u16, message: &str) -> CacheResult<Object> {
        let now = self.now();
        let object = self.find_or_create(key.clone(), Visibility::Private, None)?;
        object.set_local(true);

        let title = escape_html(message);
        let target = escape_html(&key.to_string());
        let mut offset = 0;
        offset += object.append_fmt(
            offset,
            format_args!(
                "<!DOCTYPE HTML PUBLIC \"-//W3C//DTD HTML 4.01//EN\" \
                 \"http://www.w3.org/TR/html4/strict.dtd\">\n\
                 <html><head>\n<title>Proxy error: {code} {title}.</title>\n</head><body>\n\
                 <h1>Proxy error: {code} {title}.</h1>\n"
            ),
        )?;
        offset += object.append_fmt(
            offset,
            format_args!(
                "<p>The following error occurred while trying to access \
                 <strong>{target}</strong>:<br><br>\n<strong>{code} {title}</strong></p>\n"
            ),
        )?;
        offset += object.append_fmt(
            offset,
            format_args!("<hr>Generated at {now} by hoard.\n</body></html>\n"),
        )?;

        let headers = format!("Content-Type: text/html\r\nContent-Length: {offset}\r\n");
        let atoms = self.atoms();
        object.set_status(code, Some(atoms.intern(message.as_bytes())?));
        object.set_metadata(CacheMetadata {
            date: Some(now),
            control: CacheControl::with_flags(Directives::NO_CACHE),
            ..CacheMetadata::default()
        });
        object.mark_partial(Some(offset), atoms.intern(headers.as_bytes())?)?;
        object.finish_fetch();
        Ok(object)
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
