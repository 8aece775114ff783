//! Role selector page served at `/`.

use super::{MFA_PATH, PROFILE_PATH, REFRESH_PATH};

const TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>credbroker - Metadata Credential Server</title>
<script>
function postProfile(role) {
  var xhr = new XMLHttpRequest();
  xhr.onreadystatechange = function() {
    if (this.readyState != 4) {
      return;
    }
    if (this.status == 200) {
      document.getElementById("message").innerHTML =
        "Credentials will expire on <i>" + this.responseText + "</i>";
    } else if (this.status == 401) {
      var code = prompt("Enter MFA Code", "");
      this.open("POST", __MFA_EP__, true);
      this.send(code);
    } else {
      document.getElementById("message").textContent = this.responseText;
    }
  };
  xhr.open("POST", __PROFILE_EP__, true);
  xhr.send(role);
}

function selectActive() {
  var xhr = new XMLHttpRequest();
  xhr.onreadystatechange = function() {
    if (this.readyState != 4 || this.status != 200) {
      return;
    }
    var opts = document.getElementById("roles").options;
    opts[0].selected = true;
    for (var i = 0; i < opts.length; i++) {
      if (opts[i].text == this.responseText) {
        opts[i].selected = true;
        postProfile(this.responseText);
        break;
      }
    }
  };
  xhr.open("GET", __PROFILE_EP__, true);
  xhr.send();
}

window.addEventListener("load", function() {
  selectActive();

  document.getElementById("roles").onchange = function(evt) {
    postProfile(evt.target.value);
    return false;
  };

  document.getElementById("refresh").onclick = function() {
    var xhr = new XMLHttpRequest();
    xhr.onreadystatechange = function() {
      if (this.readyState == 4 && this.status == 200) {
        var roles = document.getElementById("roles");
        postProfile(roles.options[roles.selectedIndex].text);
      }
    };
    xhr.open("POST", __REFRESH_EP__, true);
    xhr.send();
    return false;
  };
});
</script>
<style>
body { background-color: #1d2b3a; font-family: sans-serif; margin: 0; }
#content { background-color: white; margin: 2em auto; width: 32em; padding: 1em; border-radius: 0.3em; }
#title { text-align: center; }
#message { margin-top: 1em; }
#refresh { margin-left: 2em; padding: 0.4em 1em; font-weight: bold; }
</style>
</head>
<body>
<div id="content">
  <div id="title"><h2>Metadata Service Role Selector</h2></div>
  <form>
    <label for="roles"><b>Roles</b></label>
    <select id="roles" name="roles">
      <option value="">-- Select Role --</option>
__ROLE_OPTIONS__
    </select>
    <button id="refresh" type="button" title="Force a refresh of the credentials, may require re-entering the MFA code">Refresh Now</button>
  </form>
  <div id="message">&nbsp;</div>
</div>
</body>
</html>
"#;

/// Render the page with one `<option>` per role
pub fn render<'a>(roles: impl IntoIterator<Item = &'a str>) -> String {
    let options = roles
        .into_iter()
        .map(|role| format!("      <option>{}</option>", escape_html(role)))
        .collect::<Vec<_>>()
        .join("\n");

    TEMPLATE
        .replace("__ROLE_OPTIONS__", &options)
        .replace("__PROFILE_EP__", &js_string(PROFILE_PATH))
        .replace("__MFA_EP__", &js_string(MFA_PATH))
        .replace("__REFRESH_EP__", &js_string(REFRESH_PATH))
}

fn js_string(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
