//! Generated script modules: proxies for non-script outputs, the HMR prelude
//! and HTML client injection.

/// URL the HMR client runtime is served from.
pub const HMR_CLIENT_URL: &str = "/__kiln__/hmr-client.js";

/// Import prelude that gives a module its `import.meta.hot` context.
pub fn hmr_prelude() -> String {
    format!(
        "import * as __KILN_HMR__ from '{HMR_CLIENT_URL}';\n\
         import.meta.hot = __KILN_HMR__.createHotContext(import.meta.url);\n"
    )
}

/// Style-injecting module for CSS output.
///
/// With `hmr` the module accepts its own updates and removes its `<style>`
/// element when replaced.
pub fn css_proxy(css: &[u8], hmr: bool) -> String {
    let css = String::from_utf8_lossy(css);
    let literal = js_string(&css);

    let mut code = String::new();
    if hmr {
        code.push_str(&hmr_prelude());
    }
    code.push_str(&format!(
        "const code = {literal};\n\
         const styleEl = document.createElement('style');\n\
         styleEl.appendChild(document.createTextNode(code));\n\
         document.head.appendChild(styleEl);\n"
    ));
    if hmr {
        code.push_str(
            "import.meta.hot.accept();\n\
             import.meta.hot.dispose(() => {\n  document.head.removeChild(styleEl);\n});\n",
        );
    }
    code.push_str("export default code;\n");
    code
}

/// Module whose default export is the parsed JSON document.
pub fn json_proxy(json: &[u8]) -> String {
    let text = String::from_utf8_lossy(json);
    if serde_json::from_str::<serde_json::Value>(&text).is_ok() {
        format!("export default {};\n", text.trim())
    } else {
        tracing::warn!("serving invalid JSON as a string export");
        format!("export default {};\n", js_string(&text))
    }
}

/// Module whose default export is the URL of the asset itself.
pub fn asset_proxy(url: &str) -> String {
    format!("export default {};\n", js_string(url))
}

/// Add the HMR client `<script>` to an HTML page, before `</body>` if present.
pub fn inject_hmr_client(content: &[u8]) -> Vec<u8> {
    let html = String::from_utf8_lossy(content);
    let script_tag = format!(r#"<script type="module" src="{HMR_CLIENT_URL}"></script>"#);

    if let Some(pos) = html.rfind("</body>") {
        let mut result = String::with_capacity(html.len() + script_tag.len() + 4);
        result.push_str(&html[..pos]);
        result.push_str("  ");
        result.push_str(&script_tag);
        result.push('\n');
        result.push_str(&html[pos..]);
        return result.into_bytes();
    }

    let mut result = html.into_owned();
    result.push('\n');
    result.push_str(&script_tag);
    result.into_bytes()
}

/// Content type for an output extension (with leading dot).
pub fn content_type(extension: &str) -> &'static str {
    match extension.trim_start_matches('.') {
        "js" | "mjs" => "application/javascript",
        "json" | "map" => "application/json",
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css",
        "wasm" => "application/wasm",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

fn js_string(value: &str) -> String {
    // JSON strings are valid JS string literals.
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}
