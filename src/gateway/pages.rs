//! Static HTML pages served next to the tunnel endpoint

/// Placeholder landing page for `/`
pub const HOME_PAGE: &str = r#"<html>
<head>
    <title>Under Construction</title>
    <style>
        body{font-family:Arial,sans-serif;margin:0;padding:0;background:linear-gradient(135deg,#667eea 0%,#764ba2 100%);min-height:100vh;display:flex;align-items:center;justify-content:center}
        .container{text-align:center;background:white;padding:60px 40px;border-radius:15px;box-shadow:0 10px 30px rgba(0,0,0,0.2);max-width:500px;margin:20px}
        h1{color:#333;font-size:2.5em;margin-bottom:20px;font-weight:300}
        p{color:#666;font-size:1.2em;line-height:1.6;margin-bottom:30px}
        .footer{color:#999;font-size:0.9em;margin-top:30px}
    </style>
</head>
<body>
    <div class="container">
        <h1>Website Under Construction</h1>
        <p>We're working hard to bring you something amazing. Please check back soon!</p>
        <div class="footer">Thank you for your patience.</div>
    </div>
</body>
</html>
"#;

/// Status page showing the listen port and the encoded share link.
///
/// Both values are plain ASCII (a port number and base64) so no escaping is needed.
pub fn status_page(port: u16, share_link: &str) -> String {
    format!(
        r#"<html>
<head>
    <title>Service Status</title>
    <style>
        body{{font-family:Arial,sans-serif;margin:40px;background-color:#f5f5f5}}
        .container{{max-width:600px;margin:0 auto;background:white;padding:30px;border-radius:8px;box-shadow:0 2px 10px rgba(0,0,0,0.1)}}
        h1{{color:#333;text-align:center}}
        .info-item{{margin:20px 0;padding:15px;background:#f8f9fa;border-radius:5px}}
        .label{{font-weight:bold;color:#555;margin-bottom:10px}}
        .value{{font-family:monospace;background:#e9ecef;padding:10px;border-radius:4px;word-break:break-all}}
        .copy-btn{{background:#007cba;color:white;border:none;padding:8px 15px;border-radius:3px;cursor:pointer;margin-top:10px}}
    </style>
</head>
<body>
    <div class="container">
        <h1>Service Running</h1>
        <div class="info-item">
            <div class="label">Port:</div>
            <div class="value">{port}</div>
        </div>
        <div class="info-item">
            <div class="label">Connection Link (Base64):</div>
            <div class="value" id="link">{link}</div>
            <button class="copy-btn" onclick="navigator.clipboard.writeText('{link}').then(()=>alert('Copied!'))">Copy</button>
        </div>
    </div>
</body>
</html>
"#,
        port = port,
        link = share_link,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_page_contains_values() {
        let page = status_page(3000, "dmxlc3M6Ly8=");
        assert!(page.contains("<div class=\"value\">3000</div>"));
        assert_eq!(page.matches("dmxlc3M6Ly8=").count(), 2);
    }
}
