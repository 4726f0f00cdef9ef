//! HTML for the single form page.
//!
//! The page is one centered card: loan amount, names, email, mobile and the
//! submit button, with the overlay drawn on top of the card while submitting.
//! Input formatting mirrors `formatting`, and the server validates again.

use std::time::Duration;

use crate::settings::EffectiveSettings;

const FALLBACK_COLOR: &str = "#000000";

/// Placeholder the page script swaps for the submitted first name.
const FIRST_NAME_SLOT: &str = "__FIRST_NAME__";

/// Escapes text for use in HTML content and double-quoted attributes.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Thank-you message shown once the spinner phase is over.
pub fn overlay_message(first_name: &str) -> String {
    format!(
        r#"<h3 class="overlay-title">Thanks {}!</h3>
<p>Our expert team will get to work now on matching you with one of our great lending partners. One of our friendly team members will be in touch <strong>ASAP!</strong></p>
<p class="muted">Please keep an eye out on your phone as we'll text before we call!</p>"#,
        escape_html(first_name)
    )
}

/// Wraps content in the centering layout shell.
pub fn layout(title: &str, content: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <style>
        body {{ margin: 0; font-family: system-ui, sans-serif; background: #fff; }}
        .shell {{ width: 100%; min-height: 100vh; display: flex; align-items: center; justify-content: center; }}
        .shell-inner {{ width: 100%; max-width: 400px; padding: 16px 12px; margin: 0 auto; box-sizing: border-box; }}
        .card {{ position: relative; border: 1px solid #e5e7eb; border-radius: 8px; padding: 12px; }}
        .field {{ display: flex; flex-direction: column; gap: 4px; margin-bottom: 10px; }}
        .row {{ display: grid; grid-template-columns: 1fr 1fr; gap: 16px; }}
        input {{ height: 36px; padding: 0 8px; border: 1px solid #d1d5db; border-radius: 6px; font-size: 14px; background: #fff; }}
        .error {{ color: #dc2626; font-size: 12px; min-height: 1em; }}
        button {{ width: 100%; height: 40px; border: 0; border-radius: 6px; color: #fff; font-size: 15px; cursor: pointer; }}
        .muted {{ color: #6b7280; font-size: 14px; text-align: center; }}
        .overlay {{ position: absolute; inset: 0; background: rgba(255,255,255,.8); backdrop-filter: blur(4px); display: none; align-items: center; justify-content: center; z-index: 50; text-align: center; padding: 0 24px; }}
        .overlay.visible {{ display: flex; }}
        .spinner {{ width: 96px; height: 96px; border: 8px solid currentColor; border-top-color: transparent; border-radius: 50%; animation: spin 1s linear infinite; }}
        @keyframes spin {{ to {{ transform: rotate(360deg); }} }}
        @media (max-width: 640px) {{ .row {{ grid-template-columns: 1fr; }} }}
    </style>
</head>
<body>
    <div class="shell"><div class="shell-inner">
{content}
    </div></div>
</body>
</html>
"#,
        title = escape_html(title),
        content = content
    )
}

/// Renders the form page for the effective settings.
pub fn render_form_page(settings: &EffectiveSettings, message_delay: Duration) -> String {
    let color = settings.button_color.as_deref().unwrap_or(FALLBACK_COLOR);
    let button_text = escape_html(&settings.button_text);
    let phone_placeholder = if settings.is_nz() { "02" } else { "04" };
    let flag = if settings.is_nz() { "🇳🇿" } else { "🇦🇺" };

    let config = serde_json::json!({
        "country": settings.country,
        "messageDelayMs": message_delay.as_millis() as u64,
    });
    // Keep `</script>` out of the inline JSON.
    let config = config.to_string().replace('<', "\\u003c");

    let card = format!(
        r#"<div class="card">
    <div class="overlay" id="overlay">
        <div class="spinner" id="overlay-spinner" style="color: {color}"></div>
        <div id="overlay-message" hidden></div>
    </div>
    <form id="lead-form" novalidate>
        <div class="field">
            <label for="amount">Loan Amount</label>
            <input id="amount" name="amount" inputmode="numeric" placeholder="25,000">
            <span class="error" data-error-for="amount"></span>
        </div>
        <div class="row">
            <div class="field">
                <label for="fname">First Name</label>
                <input id="fname" name="fname" placeholder="First Name">
                <span class="error" data-error-for="fname"></span>
            </div>
            <div class="field">
                <label for="lname">Last Name</label>
                <input id="lname" name="lname" placeholder="Last Name">
                <span class="error" data-error-for="lname"></span>
            </div>
        </div>
        <div class="field">
            <label for="email">Email</label>
            <input id="email" name="email" type="email" autocomplete="off" placeholder="email@example.com">
            <span class="error" data-error-for="email"></span>
        </div>
        <div class="field">
            <label for="phone">Mobile Number <span aria-hidden="true">{flag}</span></label>
            <input id="phone" name="phone" inputmode="tel" placeholder="{phone_placeholder}">
            <span class="error" data-error-for="phone"></span>
        </div>
        <button type="submit" style="background-color: {color}; color: #ffffff">{button_text}</button>
        <p class="muted">By clicking the {button_text} button, you agree to the privacy policy on this website</p>
    </form>
</div>
<template id="overlay-message-template">{message_template}</template>
<script type="application/json" id="form-config">{config}</script>
<script>{script}</script>"#,
        color = escape_html(color),
        flag = flag,
        phone_placeholder = phone_placeholder,
        button_text = button_text,
        message_template = overlay_message(FIRST_NAME_SLOT),
        config = config,
        script = FORM_SCRIPT,
    );

    layout(&settings.brand, &card)
}

const FORM_SCRIPT: &str = r#"
(function () {
  var cfg = JSON.parse(document.getElementById('form-config').textContent);
  var form = document.getElementById('lead-form');
  var overlay = document.getElementById('overlay');
  var spinner = document.getElementById('overlay-spinner');
  var message = document.getElementById('overlay-message');
  var values = { fname: '', lname: '', email: '', phone: '', amount: '' };
  var messageTimer = null;

  function digits(v) { return v.replace(/[^0-9]/g, ''); }
  function groupAmount(v) { return digits(v).replace(/\B(?=(\d{3})+(?!\d))/g, ','); }
  function groupPhone(v) {
    var d = digits(v);
    if (cfg.country !== 'AU' || d.length <= 4) return d;
    if (d.length <= 7) return d.slice(0, 4) + ' ' + d.slice(4);
    return d.slice(0, 4) + ' ' + d.slice(4, 7) + ' ' + d.slice(7);
  }
  function capitalize(v) { return v.charAt(0).toUpperCase() + v.slice(1); }
  function setError(field, text) {
    var el = form.querySelector('[data-error-for="' + field + '"]');
    if (el) el.textContent = text || '';
  }
  function escapeHtml(v) {
    return v.replace(/[&<>"']/g, function (c) {
      return { '&': '&amp;', '<': '&lt;', '>': '&gt;', '"': '&quot;', "'": '&#x27;' }[c];
    });
  }

  form.amount.addEventListener('input', function (e) {
    var d = digits(e.target.value);
    if (d === '' || parseInt(d, 10) <= 100000000) values.amount = d;
    e.target.value = groupAmount(values.amount);
  });
  form.phone.addEventListener('input', function (e) {
    var d = digits(e.target.value);
    if (d.length <= 10) values.phone = d;
    e.target.value = groupPhone(values.phone);
  });
  ['fname', 'lname'].forEach(function (name) {
    form[name].addEventListener('input', function (e) {
      e.target.value = capitalize(e.target.value);
      values[name] = e.target.value;
    });
  });
  form.email.addEventListener('input', function (e) { values.email = e.target.value; });

  function checkField(name) {
    return fetch('/api/v1/leads/validate', {
      method: 'POST',
      headers: { 'Content-Type': 'application/json' },
      body: JSON.stringify({ field: name, value: values[name] })
    })
      .then(function (r) { return r.json(); })
      .then(function (res) {
        setError(name, res.valid ? '' : res.message);
        return res.valid;
      });
  }
  function validateAll() {
    return Promise.all(Object.keys(values).map(checkField))
      .then(function (results) { return results.every(Boolean); });
  }
  Object.keys(values).forEach(function (name) {
    form[name].addEventListener('blur', function () { checkField(name).catch(function () {}); });
  });

  // One timer, mirroring the server's overlay snapshot.
  function showMessage(firstName) {
    spinner.hidden = true;
    var template = document.getElementById('overlay-message-template').innerHTML;
    message.innerHTML = template.replace('__FIRST_NAME__', escapeHtml(firstName));
    message.hidden = false;
  }
  function scheduleMessage(firstName, delayMs) {
    clearTimeout(messageTimer);
    messageTimer = setTimeout(function () { showMessage(firstName); }, delayMs);
  }
  function showOverlay(firstName) {
    overlay.classList.add('visible');
    spinner.hidden = false;
    message.hidden = true;
    scheduleMessage(firstName, cfg.messageDelayMs);
  }
  function applyOverlay(snapshot, firstName) {
    if (!snapshot) return;
    if (snapshot.phase === 'message') {
      clearTimeout(messageTimer);
      showMessage(firstName);
    } else if (snapshot.phase === 'spinner') {
      scheduleMessage(firstName, snapshot.message_in_ms || 0);
    }
  }
  function hideOverlay() {
    clearTimeout(messageTimer);
    overlay.classList.remove('visible');
  }
  window.addEventListener('pagehide', function () { clearTimeout(messageTimer); });

  var button = form.querySelector('button[type="submit"]');
  function submitLead(firstName) {
    var body = {
      fname: values.fname, lname: values.lname, email: values.email,
      phone: values.phone, amount: values.amount,
      submission_url: document.referrer || window.location.href,
      has_top_frame: !!window.top
    };
    fetch('/api/v1/leads' + window.location.search, {
      method: 'POST',
      headers: { 'Content-Type': 'application/json' },
      body: JSON.stringify(body)
    }).then(function (r) {
      if (r.status === 422) {
        return r.json().then(function (res) {
          Object.keys(res.fields || {}).forEach(function (name) { setError(name, res.fields[name]); });
          hideOverlay();
          button.disabled = false;
        });
      }
      return r.json().then(function (res) {
        applyOverlay(res.overlay, res.first_name || firstName);
        if (res.status === 'redirecting') {
          if (res.target === 'top' && window.top) window.top.location.href = res.redirect_url;
          else window.location.href = res.redirect_url;
        }
      });
    }).catch(function (err) { console.error('Error submitting form:', err); });
  }

  form.addEventListener('submit', function (e) {
    e.preventDefault();
    if (button.disabled) return;
    button.disabled = true;
    validateAll().then(function (ok) {
      if (!ok) {
        button.disabled = false;
        return;
      }
      showOverlay(values.fname);
      submitLead(values.fname);
    }, function (err) {
      console.error('Error validating form:', err);
      button.disabled = false;
    });
  });
})();
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{resolve_settings, ColorPalette, SettingsProps, SettingsQuery};

    fn settings(query: SettingsQuery) -> EffectiveSettings {
        resolve_settings(&SettingsProps::default(), &query, &ColorPalette::default())
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<b>"Tom" & 'Jerry'</b>"#),
            "&lt;b&gt;&quot;Tom&quot; &amp; &#x27;Jerry&#x27;&lt;/b&gt;"
        );
    }

    #[test]
    fn test_page_uses_button_settings() {
        let page = render_form_page(
            &settings(SettingsQuery {
                color: Some("green".to_string()),
                button_text: Some("Apply+Now".to_string()),
                ..Default::default()
            }),
            Duration::from_secs(2),
        );

        assert!(page.contains("background-color: #008000"));
        assert!(page.contains(">Apply Now</button>"));
        assert!(page.contains("By clicking the Apply Now button"));
        assert!(page.contains(r#""messageDelayMs":2000"#));
        assert!(page.contains(r#"placeholder="04""#));
        assert!(page.contains("Thanks __FIRST_NAME__!"));
    }

    #[test]
    fn test_page_defaults_to_black_button() {
        let page = render_form_page(&settings(SettingsQuery::default()), Duration::from_secs(2));
        assert!(page.contains("background-color: #000000"));
    }

    #[test]
    fn test_query_text_is_escaped() {
        let page = render_form_page(
            &settings(SettingsQuery {
                button_text: Some("<script>alert(1)</script>".to_string()),
                source: Some("</title><script>".to_string()),
                ..Default::default()
            }),
            Duration::from_secs(2),
        );
        assert!(!page.contains("<script>alert(1)</script>"));
        assert!(page.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(!page.contains("</title><script>"));
    }

    fn submit_handler(page: &str) -> &str {
        let start = page.find("form.addEventListener('submit'").unwrap();
        &page[start..]
    }

    #[test]
    fn test_overlay_waits_for_every_field_to_pass() {
        let page = render_form_page(&settings(SettingsQuery::default()), Duration::from_secs(2));
        let handler = submit_handler(&page);

        let validated = handler.find("validateAll().then").unwrap();
        let rejected = handler.find("if (!ok)").unwrap();
        let overlay = handler.find("showOverlay(").unwrap();
        let submitted = handler.find("submitLead(").unwrap();

        assert!(validated < rejected);
        assert!(rejected < overlay);
        assert!(overlay < submitted);
        assert!(page.contains("Promise.all(Object.keys(values).map(checkField))"));
    }

    #[test]
    fn test_overlay_timer_follows_server_snapshot() {
        let page = render_form_page(&settings(SettingsQuery::default()), Duration::from_secs(2));

        assert!(page.contains("applyOverlay(res.overlay"));
        assert!(page.contains("snapshot.message_in_ms"));
        assert_eq!(page.matches("setTimeout(").count(), 1);
    }

    #[test]
    fn test_overlay_message_names_visitor() {
        let html = overlay_message("Jane");
        assert!(html.contains("Thanks Jane!"));
        assert!(html.contains("ASAP!"));
        assert!(overlay_message("<i>").contains("Thanks &lt;i&gt;!"));
    }
}
