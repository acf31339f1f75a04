//! Embedded provisioning scripts.
//!
//! The actual download/extract/npm-install work runs inside an elevated
//! shell, not in this process. The scripts receive the install log path, the
//! launcher's local data folder and the version tag as parameters and are
//! responsible for writing metadata.json on success.

use super::InstallError;

/// Host OS family, which decides script body and elevation mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Windows,
    Linux,
    MacOs,
}

impl OsFamily {
    pub fn current() -> Result<Self, InstallError> {
        if cfg!(target_os = "windows") {
            Ok(OsFamily::Windows)
        } else if cfg!(target_os = "linux") {
            Ok(OsFamily::Linux)
        } else if cfg!(target_os = "macos") {
            Ok(OsFamily::MacOs)
        } else {
            Err(InstallError::UnsupportedPlatform)
        }
    }

    pub fn script_file_name(&self) -> &'static str {
        match self {
            OsFamily::Windows => "install.ps1",
            OsFamily::Linux | OsFamily::MacOs => "install.sh",
        }
    }

    pub fn script_body(&self) -> &'static str {
        match self {
            OsFamily::Windows => POWERSHELL_SCRIPT,
            OsFamily::Linux | OsFamily::MacOs => BASH_SCRIPT,
        }
    }
}

const POWERSHELL_SCRIPT: &str = r#"
[CmdletBinding()]
param (
    [Parameter(Mandatory=$true)][string]$LogFilePath,
    [Parameter(Mandatory=$true)][string]$AppLocalFolder,
    [Parameter(Mandatory=$true)][string]$LatestVersion
)

function Write-Log {
    param ([string]$Message)
    "$Message" | Out-File -FilePath $LogFilePath -Append
}

try {
    Write-Log '--- Starting mindcraft-ce installation ---'
    $InstallationDir = Join-Path -Path $AppLocalFolder -ChildPath 'mindcraft-ce-install'
    $BackupDir = Join-Path -Path $env:TEMP -ChildPath 'mindcraft-ce-backup'
    if (Test-Path $BackupDir) { Remove-Item $BackupDir -Recurse -Force }

    # Keep user-owned files across a reinstall.
    if (Test-Path $InstallationDir) {
        Write-Log 'Previous installation found. Backing up user data...'
        New-Item -Path $BackupDir -ItemType Directory | Out-Null
        foreach ($item in @('settings.json', 'keys.json', '.logging_consent', 'gui_agents', 'bots')) {
            $source = Join-Path -Path $InstallationDir -ChildPath $item
            if (Test-Path $source) {
                Write-Log "... backing up $item"
                Move-Item -Path $source -Destination $BackupDir
            }
        }
        Write-Log 'Backup complete. Removing old installation...'
        Remove-Item $InstallationDir -Recurse -Force
    }

    Write-Log '--- Checking prerequisites ---'
    if (-not (Get-Command git -ErrorAction SilentlyContinue)) {
        Write-Log 'Downloading Git...'
        $gitInstaller = Join-Path -Path $env:TEMP -ChildPath 'git-installer.exe'
        Invoke-WebRequest -Uri 'https://github.com/git-for-windows/git/releases/download/v2.50.1.windows.1/Git-2.50.1-64-bit.exe' -OutFile $gitInstaller
        Write-Log 'Installing Git...'
        Start-Process -FilePath $gitInstaller -ArgumentList '/VERYSILENT /NORESTART' -Wait
    } else {
        Write-Log 'Git is already installed.'
    }
    if (-not (Get-Command node -ErrorAction SilentlyContinue)) {
        Write-Log 'Downloading Node.js...'
        $nodeInstaller = Join-Path -Path $env:TEMP -ChildPath 'node-installer.msi'
        Invoke-WebRequest -Uri 'https://nodejs.org/dist/v22.17.1/node-v22.17.1-x64.msi' -OutFile $nodeInstaller
        Write-Log 'Installing Node.js...'
        Start-Process msiexec.exe -ArgumentList "/i `"$nodeInstaller`" /quiet /qn /norestart" -Wait
    } else {
        Write-Log 'Node.js is already installed.'
    }
    $env:Path = [System.Environment]::GetEnvironmentVariable('Path','Machine') + ';' + [System.Environment]::GetEnvironmentVariable('Path','User')

    Write-Log '--- Downloading mindcraft-ce ---'
    $zipUrl = "https://github.com/mindcraft-ce/mindcraft-ce/archive/refs/tags/$LatestVersion.zip"
    $zipFile = Join-Path -Path $env:TEMP -ChildPath "mindcraft-ce-$LatestVersion.zip"
    $extractDir = Join-Path -Path $env:TEMP -ChildPath 'mindcraft-ce-extract'
    if (Test-Path $extractDir) { Remove-Item $extractDir -Recurse -Force }
    New-Item -Path $InstallationDir -ItemType Directory | Out-Null

    Write-Log "Downloading $zipUrl..."
    Invoke-WebRequest -Uri $zipUrl -OutFile $zipFile
    Write-Log 'Extracting archive...'
    Expand-Archive -Path $zipFile -DestinationPath $extractDir -Force
    $nested = Get-ChildItem -Path $extractDir | Select-Object -First 1
    Get-ChildItem -Path $nested.FullName | Move-Item -Destination $InstallationDir
    Remove-Item $extractDir, $zipFile -Recurse -Force
    Set-Location -Path $InstallationDir

    if (Test-Path $BackupDir) {
        Write-Log '--- Restoring user data ---'
        Get-ChildItem -Path $BackupDir | Move-Item -Destination $InstallationDir -Force
        Remove-Item $BackupDir -Recurse -Force
        Write-Log 'User data restored.'
    }

    if (-not (Test-Path 'settings.json')) {
        Write-Log 'Fresh install detected. Generating default configuration...'
        Rename-Item -Path 'keys.example.json' -NewName 'keys.json'
        (Get-Content -Path 'settings.js' -Raw) -replace '"./andy.json",', '"./gui_agents/andy.json",' | Set-Content -Path 'settings.js'
        New-Item -Path 'gui_agents' -ItemType Directory -Force | Out-Null
        Move-Item -Path 'andy.json' -Destination 'gui_agents'
        node -e "(async () => { const fs = require('fs'); const settings = await import('./settings.js'); fs.writeFileSync('./settings.json', JSON.stringify(settings.default, null, 2)); })()"
        @{ consent = $false } | ConvertTo-Json | Set-Content -Path (Join-Path -Path $InstallationDir -ChildPath '.logging_consent')
    } else {
        Write-Log 'Existing settings.json restored. Skipping default configuration.'
    }

    Write-Log '--- Running npm install ---'
    npm install --verbose *>&1 | ForEach-Object { Write-Log $_ }

    Write-Log '--- Finalizing installation ---'
    $metadata = @{ version = $LatestVersion; installed = $true; installation_path = $InstallationDir }
    $metadata | ConvertTo-Json | Set-Content -Path (Join-Path -Path $AppLocalFolder -ChildPath 'metadata.json')
    Write-Log '--- mindcraft-ce has been successfully installed! ---'
}
catch {
    Write-Log ''
    Write-Log '--- FATAL SCRIPT ERROR ---'
    Write-Log $_.Exception.Message
    Write-Log $_.Exception.InvocationInfo.PositionMessage
    exit 1
}
"#;

const BASH_SCRIPT: &str = r#"#!/bin/bash
set -e

LOG_FILE="$1"
APP_LOCAL_FOLDER="$2"
LATEST_VERSION="$3"

write_log() {
    echo "$(date '+%Y-%m-%d %H:%M:%S') - $1" >> "$LOG_FILE"
}

install_dependency() {
    local cmd=$1
    local package=$2
    write_log "--- Checking $cmd ---"
    if command -v "$cmd" &> /dev/null; then
        write_log "$cmd is already installed."
        return
    fi
    write_log "$cmd not found. Attempting installation..."
    if [[ "$(uname)" == "Darwin" ]]; then
        if command -v brew &> /dev/null; then
            brew install "$package" >> "$LOG_FILE" 2>&1
        else
            write_log "ERROR: Homebrew is not installed. Please install it to continue."
            exit 1
        fi
    elif command -v apt-get &> /dev/null; then
        apt-get update >> "$LOG_FILE" 2>&1
        apt-get install -y "$package" >> "$LOG_FILE" 2>&1
    elif command -v dnf &> /dev/null; then
        dnf install -y "$package" >> "$LOG_FILE" 2>&1
    elif command -v pacman &> /dev/null; then
        pacman -S --noconfirm "$package" >> "$LOG_FILE" 2>&1
    else
        write_log "ERROR: no supported package manager found (apt, dnf, pacman)."
        exit 1
    fi
}

exec > >(tee -a "$LOG_FILE") 2>&1
write_log "--- Starting mindcraft-ce installation ---"

INSTALLATION_DIR="$APP_LOCAL_FOLDER/mindcraft-ce-install"
BACKUP_DIR="/tmp/mindcraft-ce-backup"

# Keep user-owned files across a reinstall.
if [ -d "$INSTALLATION_DIR" ]; then
    write_log "Previous installation found. Backing up user data..."
    rm -rf "$BACKUP_DIR"
    mkdir -p "$BACKUP_DIR"
    for item in settings.json keys.json .logging_consent gui_agents bots; do
        if [ -e "$INSTALLATION_DIR/$item" ]; then
            mv "$INSTALLATION_DIR/$item" "$BACKUP_DIR/"
            write_log "... backing up $item"
        fi
    done
    write_log "Backup complete. Removing old installation..."
    rm -rf "$INSTALLATION_DIR"
fi

install_dependency git git
install_dependency node nodejs
install_dependency unzip unzip
install_dependency curl curl

write_log "--- Downloading mindcraft-ce ---"
ZIP_URL="https://github.com/mindcraft-ce/mindcraft-ce/archive/refs/tags/$LATEST_VERSION.zip"
ZIP_FILE="/tmp/mindcraft-ce-$LATEST_VERSION.zip"
EXTRACT_DIR="/tmp/mindcraft-ce-extract"

rm -rf "$EXTRACT_DIR"
mkdir -p "$INSTALLATION_DIR"

write_log "Downloading $ZIP_URL..."
curl -L "$ZIP_URL" -o "$ZIP_FILE"
write_log "Extracting archive..."
unzip -q "$ZIP_FILE" -d "$EXTRACT_DIR"
mv "$EXTRACT_DIR"/*/* "$INSTALLATION_DIR"
rm -rf "$EXTRACT_DIR" "$ZIP_FILE"

if [ -d "$BACKUP_DIR" ]; then
    write_log "--- Restoring user data ---"
    cp -r "$BACKUP_DIR"/* "$INSTALLATION_DIR"/
    rm -rf "$BACKUP_DIR"
    write_log "User data restored."
fi

ORIGINAL_USER=$(logname)
if [ -z "$ORIGINAL_USER" ]; then
    write_log "FATAL: could not determine the original user."
    exit 1
fi

# The remaining setup must run as the invoking user, not root, so that the
# installation stays editable and npm uses the user's Node version.
USER_SCRIPT="/tmp/mindcraft-ce-user-setup.sh"
rm -f "$USER_SCRIPT"
cat <<EOF > "$USER_SCRIPT"
#!/bin/bash
set -e
exec > >(tee -a "$LOG_FILE") 2>&1
cd "$INSTALLATION_DIR"

if [ ! -f "settings.json" ]; then
    echo "Fresh install detected. Generating default configuration..."
    mv keys.example.json keys.json
    sed -i.bak 's/"\.\/andy\.json",/"\.\/gui_agents\/andy\.json",/g' settings.js
    mkdir -p gui_agents
    mv andy.json gui_agents/
    node -e "(async () => { const fs = require('fs'); const settings = await import('./settings.js'); fs.writeFileSync('./settings.json', JSON.stringify(settings.default, null, 2)); })()"
    printf '{\n  "consent": false\n}' > .logging_consent
fi

export NVM_DIR="\$HOME/.nvm"
if [ -s "\$NVM_DIR/nvm.sh" ]; then
    \. "\$NVM_DIR/nvm.sh"
fi

echo "--- Running npm install ---"
npm install --verbose
EOF

chmod +x "$USER_SCRIPT"
chown "$ORIGINAL_USER" "$USER_SCRIPT"
chown -R "$ORIGINAL_USER" "$INSTALLATION_DIR"
write_log "Running setup as '$ORIGINAL_USER'..."
su - "$ORIGINAL_USER" -c "$USER_SCRIPT"
rm "$USER_SCRIPT"

write_log "--- Finalizing installation ---"
printf '{"version":"%s","installed":true,"installation_path":"%s"}' "$LATEST_VERSION" "$INSTALLATION_DIR" > "$APP_LOCAL_FOLDER/metadata.json"
chown -R "$ORIGINAL_USER" "$INSTALLATION_DIR"
write_log "--- mindcraft-ce has been successfully installed! ---"
exit 0
"#;
