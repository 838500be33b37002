//! Static HTML served by the ephemeral listeners.

/// Configuration screen: asks for the connected app's Consumer Key and
/// submits it back as `GET /submit?consumer_key=...`.
pub(crate) const CONFIG_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Forcelink - Salesforce Configuration</title></head>
<body style="font-family: system-ui; max-width: 640px; margin: 40px auto; padding: 20px;">
<h1>Salesforce Configuration</h1>
<p>Enter the Consumer Key of a connected app configured with OAuth enabled,
callback URL <code>http://localhost:8787</code>, and the
<code>api</code>, <code>refresh_token</code>, and <code>full</code> scopes.
Your Salesforce administrator can create one under Setup &gt; App Manager.</p>
<form id="configForm">
  <label for="consumer_key">Consumer Key:</label><br>
  <input type="text" id="consumer_key" name="consumer_key" style="width: 100%; padding: 8px; margin: 10px 0;"
         placeholder="Enter your org's Consumer Key" required><br>
  <button type="submit" style="padding: 10px 20px;">Save Configuration</button>
</form>
<div id="error" style="color: #d93025; margin-top: 10px;"></div>
<script>
  document.getElementById('configForm').onsubmit = function(e) {
    e.preventDefault();
    var consumerKey = document.getElementById('consumer_key').value;
    if (!consumerKey || consumerKey.length < 10) {
      document.getElementById('error').textContent = 'Please enter a valid Consumer Key';
      return;
    }
    fetch('/submit?consumer_key=' + encodeURIComponent(consumerKey))
      .then(response => response.json())
      .then(data => {
        if (data.success) {
          document.body.innerHTML = '<h1>Configuration Successful!</h1>' +
            '<p>You can close this window and return to the terminal.</p>';
        } else {
          document.getElementById('error').textContent = data.error || 'Configuration failed';
        }
      })
      .catch(() => {
        document.getElementById('error').textContent = 'Error saving configuration';
      });
  };
</script>
</body>
</html>"#;

/// Environment selector: production / sandbox / cancel buttons submitting
/// `GET /select?env=...`.
pub(crate) const SELECTOR_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Forcelink - Salesforce Login</title></head>
<body style="font-family: system-ui; text-align: center; padding: 50px; background: #f5f5f5;">
<div style="max-width: 400px; margin: 0 auto; background: white; padding: 40px; border-radius: 8px;">
<h1>Select Salesforce Environment</h1>
<div style="display: flex; flex-direction: column; gap: 1rem; margin: 2rem 0;">
  <button style="padding: 12px;" onclick="selectEnvironment('production')">Salesforce Production</button>
  <button style="padding: 12px;" onclick="selectEnvironment('sandbox')">Salesforce Sandbox</button>
  <button style="padding: 12px;" onclick="selectEnvironment('cancel')">Cancel</button>
</div>
<div id="status" style="color: #666;"></div>
</div>
<script>
  async function selectEnvironment(env) {
    const status = document.getElementById('status');
    try {
      status.textContent = 'Processing selection...';
      const response = await fetch('/select?env=' + encodeURIComponent(env));
      const data = await response.json();
      if (response.ok && data.status === 'ok') {
        status.textContent = 'Selection successful! You can close this window.';
        window.close();
      } else {
        status.textContent = data.message || 'Error processing selection. Please try again.';
      }
    } catch (error) {
      status.textContent = 'Error: ' + error.message;
    }
  }
</script>
</body>
</html>"#;

/// Callback relay page. The identity provider returns the token in the URL
/// fragment, which browsers never send to the server; this script reads
/// `window.location.hash` and re-submits it as a `hash` query parameter.
pub(crate) const CALLBACK_RELAY_PAGE: &str = r#"<!DOCTYPE html>
<html>
<body>
<script>
  var hash = window.location.hash;
  if (hash) {
    var fragment = hash.substring(1);
    fetch('/?hash=' + encodeURIComponent(fragment))
      .then(() => {
        document.body.innerHTML = 'Authentication successful! You can close this window.';
      });
  }
</script>
<p>Processing authentication response...</p>
</body>
</html>"#;

/// Plain confirmation once the fragment has been captured.
pub(crate) const CALLBACK_DONE: &str =
    "Authentication successful! You can close this window.";
