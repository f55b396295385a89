//! Web dashboard HTML and UI.

use axum::response::Html;

/// Serve the main dashboard page.
pub async fn index() -> Html<&'static str> {
    Html(HTML_CONTENT)
}

const HTML_CONTENT: &str = r#"
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>IPTV Tuner</title>
    <style>
        * { margin: 0; padding: 0; box-sizing: border-box; }

        body {
            font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif;
            background: linear-gradient(135deg, #667eea 0%, #764ba2 100%);
            min-height: 100vh;
            padding: 20px;
            color: #333;
        }

        .container { max-width: 1000px; margin: 0 auto; }

        h1 { color: white; margin-bottom: 20px; }

        .card {
            background: white;
            border-radius: 10px;
            padding: 20px;
            margin-bottom: 20px;
            box-shadow: 0 4px 6px rgba(0, 0, 0, 0.1);
        }

        .card h2 { font-size: 1.1em; margin-bottom: 12px; color: #667eea; }

        label { display: block; margin: 10px 0 4px; font-weight: 600; font-size: 0.9em; }

        input[type=text], input[type=number] {
            width: 100%;
            padding: 8px;
            border: 1px solid #ddd;
            border-radius: 5px;
        }

        button {
            margin-top: 14px;
            padding: 8px 16px;
            background: #667eea;
            color: white;
            border: none;
            border-radius: 5px;
            cursor: pointer;
        }

        button:hover { background: #5568d3; }

        .categories { display: flex; flex-wrap: wrap; gap: 8px; margin-top: 8px; }

        .categories label {
            font-weight: normal;
            background: #f3f4f6;
            padding: 4px 10px;
            border-radius: 12px;
            margin: 0;
        }

        .status-grid { display: grid; grid-template-columns: repeat(auto-fit, minmax(180px, 1fr)); gap: 12px; }

        .stat { background: #f9fafb; padding: 12px; border-radius: 8px; }
        .stat .value { font-size: 1.3em; font-weight: bold; word-break: break-all; }
        .stat .name { font-size: 0.8em; color: #666; }

        #message { color: white; margin-bottom: 12px; min-height: 1.2em; }
    </style>
</head>
<body>
<div class="container">
    <h1>IPTV Tuner</h1>
    <div id="message"></div>

    <div class="card">
        <h2>Status</h2>
        <div class="status-grid" id="status"></div>
    </div>

    <div class="card">
        <h2>Settings</h2>
        <label for="m3u_url">Playlist URL</label>
        <input type="text" id="m3u_url">
        <label for="update_interval_hours">Refresh interval (hours)</label>
        <input type="number" id="update_interval_hours" min="1">
        <label for="kill_switch_delay_ms">Kill switch delay (ms)</label>
        <input type="number" id="kill_switch_delay_ms" min="0">
        <label for="read_timeout_seconds">Read timeout (seconds)</label>
        <input type="number" id="read_timeout_seconds" min="1">
        <label for="user_agent">User-Agent</label>
        <input type="text" id="user_agent">
        <label for="device_name">Device name</label>
        <input type="text" id="device_name">
        <button onclick="saveSettings()">Save</button>
        <button onclick="refreshPlaylist()">Refresh playlist</button>
    </div>

    <div class="card">
        <h2>Categories</h2>
        <div class="categories" id="categories"></div>
        <button onclick="saveCategories()">Apply selection</button>
    </div>
</div>

<script>
    const numericFields = ['update_interval_hours', 'kill_switch_delay_ms', 'read_timeout_seconds'];
    const textFields = ['m3u_url', 'user_agent', 'device_name'];
    let selected = [];

    function showMessage(text) {
        document.getElementById('message').textContent = text;
    }

    async function post(url, body) {
        const res = await fetch(url, {
            method: 'POST',
            headers: { 'Content-Type': 'application/json' },
            body: body === undefined ? undefined : JSON.stringify(body),
        });
        const data = await res.json();
        if (!res.ok) throw new Error(data.detail || res.statusText);
        return data;
    }

    async function loadSettings() {
        const settings = await (await fetch('/api/settings')).json();
        textFields.concat(numericFields).forEach(f => {
            document.getElementById(f).value = settings[f];
        });
        selected = settings.selected_categories || [];
    }

    async function loadCategories() {
        const categories = await (await fetch('/api/categories/detail')).json();
        const container = document.getElementById('categories');
        container.innerHTML = '';
        categories.forEach(c => {
            const label = document.createElement('label');
            const box = document.createElement('input');
            box.type = 'checkbox';
            box.value = c.name;
            box.checked = selected.includes(c.name);
            label.appendChild(box);
            label.appendChild(document.createTextNode(' ' + c.display));
            container.appendChild(label);
        });
    }

    async function loadStatus() {
        const status = await (await fetch('/api/status')).json();
        const session = status.session;
        const items = [
            ['State', session.state],
            ['Session', session.id !== undefined ? '#' + session.id : '-'],
            ['Upstream', session.url || '-'],
            ['Relayed', session.bytes_relayed !== undefined ? (session.bytes_relayed / 1048576).toFixed(1) + ' MB' : '-'],
            ['Channels', status.channels_loaded],
            ['Last refresh', status.refreshed_at || 'never'],
            ['Fallback', status.fallback_available ? 'available' : 'unavailable'],
            ['Uptime', status.uptime_seconds + ' s'],
        ];
        document.getElementById('status').innerHTML = items
            .map(([name, value]) => `<div class="stat"><div class="name">${name}</div><div class="value"></div></div>`)
            .join('');
        document.querySelectorAll('#status .value').forEach((el, i) => {
            el.textContent = items[i][1];
        });
    }

    async function saveSettings() {
        const patch = {};
        textFields.forEach(f => patch[f] = document.getElementById(f).value);
        numericFields.forEach(f => patch[f] = parseInt(document.getElementById(f).value, 10));
        try {
            await post('/api/settings', patch);
            showMessage('Settings saved');
            await loadAll();
        } catch (e) {
            showMessage('Error: ' + e.message);
        }
    }

    async function saveCategories() {
        const boxes = document.querySelectorAll('#categories input:checked');
        const categories = Array.from(boxes).map(b => b.value);
        try {
            await post('/api/settings', { selected_categories: categories });
            showMessage('Category selection applied');
            await loadAll();
        } catch (e) {
            showMessage('Error: ' + e.message);
        }
    }

    async function refreshPlaylist() {
        try {
            const data = await post('/api/refresh');
            showMessage(data.message);
            await loadAll();
        } catch (e) {
            showMessage('Error: ' + e.message);
        }
    }

    async function loadAll() {
        await loadSettings();
        await loadCategories();
        await loadStatus();
    }

    loadAll();
    setInterval(loadStatus, 5000);
</script>
</body>
</html>
"#;
